// src/normalize/skills.rs
//! Skill harvesting from free-form posting text

use super::clean_text;
use crate::models::ExtractedSkill;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Upper bound on skills kept per posting
pub const MAX_SKILLS: usize = 25;

const VOCABULARY: &[&str] = &[
    "Rust", "Go", "Golang", "Python", "Java", "JavaScript", "TypeScript", "C++", "C#", ".NET",
    "Ruby", "PHP", "Kotlin", "Swift", "Scala", "Elixir", "Haskell", "Clojure", "Dart", "SQL",
    "PostgreSQL", "Postgres", "MySQL", "SQLite", "MongoDB", "Redis", "Cassandra", "DynamoDB",
    "Kafka", "RabbitMQ", "Elasticsearch", "GraphQL", "REST", "gRPC", "React", "ReactJS",
    "React.js", "React Native", "Angular", "Vue", "Vue.js", "Svelte", "Next.js", "Node.js",
    "Express", "Django", "Flask", "FastAPI", "Spring", "Spring Boot", "Rails", "Ruby on Rails",
    "Laravel", "Flutter", "Docker", "Kubernetes", "K8s", "Terraform", "Ansible", "AWS", "Azure",
    "GCP", "Google Cloud", "Linux", "Git", "CI/CD", "Jenkins", "GitHub Actions", "HTML", "CSS",
    "Sass", "Tailwind", "Webpack", "Redux", "jQuery", "Tokio", "WebAssembly", "Machine Learning",
    "TensorFlow", "PyTorch", "Pandas", "Spark", "Hadoop", "Airflow", "Snowflake", "dbt",
    "Tableau", "Power BI", "Figma", "Jira", "Agile", "Scrum", "Microservices",
];

/// Common English words that are only a skill when capitalized
const CASE_SENSITIVE: &[&str] = &["Rust", "Swift", "Express", "Spring", "Rails", "Spark", "Dart"];

static OPTIONAL_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(nice[\s-]to[\s-]have|preferred|bonus|a plus|optional|desirable)\b")
        .expect("optional marker pattern is valid")
});

static REQUIRED_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(requirements?|required|must[\s-]haves?|qualifications)\b")
        .expect("required marker pattern is valid")
});

static PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:experience (?:with|in)|knowledge of|proficien(?:t|cy) (?:in|with)|familiar(?:ity)? with|expertise in|requirements?:)\s*([^.;:\n]+)",
    )
    .expect("phrase pattern is valid")
});

static PHRASE_SPLIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i),|/|&|\band\b|\bor\b|\betc\b").expect("phrase split pattern is valid")
});

static MORE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\+?\d+\s+more$").expect("more suffix pattern is valid"));

const PHRASE_STOPWORDS: &[&str] = &[
    "the following", "following", "others", "similar", "related", "equivalent", "other", "modern", "tools",
    "technologies", "frameworks", "languages",
];

/// Skills named in `text`: vocabulary hits first (in order of appearance),
/// then short phrases after "experience with ...", capped at `MAX_SKILLS`
pub fn extract_skills(text: &str) -> Vec<ExtractedSkill> {
    let sections = section_markers(text);
    let mut found: Vec<(usize, String)> = vocabulary_hits(text);
    found.sort_by_key(|(offset, _)| *offset);

    for captures in PHRASE.captures_iter(text) {
        let Some(phrase) = captures.get(1) else {
            continue;
        };
        for (offset, part) in phrase_parts(phrase.as_str()) {
            if let Some(candidate) = phrase_candidate(part) {
                let lead = part.len() - part.trim_start().len();
                found.push((phrase.start() + offset + lead, candidate));
            }
        }
    }

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|(_, name)| seen.insert(name.to_lowercase()))
        .take(MAX_SKILLS)
        .map(|(offset, name)| ExtractedSkill {
            name,
            required: required_at(&sections, offset),
        })
        .collect()
}

/// Skills from a structured field ("Rust, SQL · Docker"), all treated as required
pub fn split_skill_field(field: &str) -> Vec<ExtractedSkill> {
    let mut seen = HashSet::new();
    field
        .split([',', ';', '|', '\n', '•', '·'])
        .map(clean_text)
        .filter(|s| !s.is_empty() && s.len() <= 60 && !MORE_SUFFIX.is_match(s))
        .filter(|s| seen.insert(s.to_lowercase()))
        .take(MAX_SKILLS)
        .map(|name| ExtractedSkill {
            name,
            required: true,
        })
        .collect()
}

fn vocabulary_hits(text: &str) -> Vec<(usize, String)> {
    let lower = text.to_ascii_lowercase();
    let mut terms: Vec<&str> = VOCABULARY.to_vec();
    // longest first so "React Native" wins over "React"
    terms.sort_by_key(|t| std::cmp::Reverse(t.len()));

    let mut taken: Vec<(usize, usize)> = Vec::new();
    let mut hits = Vec::new();
    for term in terms {
        let exact_case = term.len() <= 2
            || !term.chars().any(|c| c.is_lowercase())
            || CASE_SENSITIVE.contains(&term);
        let (haystack, needle) = if exact_case {
            (text, term.to_string())
        } else {
            (lower.as_str(), term.to_ascii_lowercase())
        };

        for (start, _) in haystack.match_indices(needle.as_str()) {
            let end = start + needle.len();
            if !on_word_boundary(text, start, end) {
                continue;
            }
            if taken.iter().any(|&(s, e)| start < e && s < end) {
                continue;
            }
            taken.push((start, end));
            hits.push((start, text[start..end].to_string()));
            break;
        }
    }
    hits
}

fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    let before_ok = before.map_or(true, |c| !c.is_alphanumeric());
    let after_ok = after.map_or(true, |c| !(c.is_alphanumeric() || c == '+' || c == '#'));
    before_ok && after_ok
}

/// Pieces of a phrase between separators, with their byte offsets
fn phrase_parts(phrase: &str) -> Vec<(usize, &str)> {
    let mut parts = Vec::new();
    let mut start = 0;
    for separator in PHRASE_SPLIT.find_iter(phrase) {
        parts.push((start, &phrase[start..separator.start()]));
        start = separator.end();
    }
    parts.push((start, &phrase[start..]));
    parts
}

fn phrase_candidate(part: &str) -> Option<String> {
    let cleaned = clean_text(part);
    let mut candidate = cleaned
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '+' && c != '#' && c != '.')
        .trim_end_matches('.')
        .to_string();
    for article in ["a ", "an ", "the ", "strong ", "solid ", "good "] {
        if candidate.to_ascii_lowercase().starts_with(article) {
            candidate = candidate[article.len()..].to_string();
        }
    }

    let words = candidate.split_whitespace().count();
    let starts_alpha = candidate.chars().next().is_some_and(|c| c.is_alphabetic());
    let is_stopword = PHRASE_STOPWORDS
        .iter()
        .any(|s| candidate.eq_ignore_ascii_case(s));
    if (1..=3).contains(&words) && (2..=30).contains(&candidate.len()) && starts_alpha && !is_stopword
    {
        Some(candidate)
    } else {
        None
    }
}

fn section_markers(text: &str) -> Vec<(usize, bool)> {
    let mut markers: Vec<(usize, bool)> = OPTIONAL_MARKER
        .find_iter(text)
        .map(|m| (m.start(), false))
        .chain(REQUIRED_MARKER.find_iter(text).map(|m| (m.start(), true)))
        .collect();
    markers.sort_by_key(|(offset, _)| *offset);
    markers
}

fn required_at(markers: &[(usize, bool)], offset: usize) -> bool {
    markers
        .iter()
        .take_while(|(start, _)| *start <= offset)
        .last()
        .map_or(true, |(_, required)| *required)
}
