//! Untrusted-input defenses: primitive validators plus the recursive
//! sanitizers applied to parsed lesson documents. Every function here is
//! total; bad input degrades to empty/filtered output instead of erroring.

use serde_json::Value;
use url::Url;

use crate::model::{Exercise, Explanation, Lesson};

pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
pub const MAX_ARRAY_LENGTH: usize = 100;
pub const MAX_TEXT_LENGTH: usize = 10_000;

const MAX_TITLE: usize = 200;
const MAX_DESCRIPTION: usize = 500;
const MAX_NAME: usize = 100;
const MAX_MEDIA_LINKS: usize = 10;
const MAX_LIST_ITEMS: usize = 20;
const MAX_ROLES: usize = 10;

// JSON has no cycles, but a hostile decoder could hand us one; keep the
// tree walk bounded either way.
const MAX_SANITIZE_DEPTH: usize = 64;

const BLOCKED_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Accepts only absolute http/https URLs of bounded length that carry none
/// of the script-injection substrings.
pub fn validate_url(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_URL_LENGTH {
        return false;
    }
    let lower = s.to_ascii_lowercase();
    if lower.contains("<script") || lower.contains("javascript:") || lower.contains("data:") {
        return false;
    }
    match Url::parse(s) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Truncates to `max_length` characters, strips `<` and `>`, trims
/// surrounding whitespace. Idempotent.
pub fn sanitize_text(s: &str, max_length: usize) -> String {
    let kept: String = s
        .chars()
        .take(max_length)
        .filter(|c| *c != '<' && *c != '>')
        .collect();
    kept.trim().to_string()
}

pub fn validate_file_size(bytes: u64) -> bool {
    bytes <= MAX_FILE_BYTES
}

pub fn validate_array_length<T>(arr: &[T]) -> bool {
    arr.len() <= MAX_ARRAY_LENGTH
}

/// Deep-clones a parsed JSON value, dropping prototype-pollution keys at
/// every nesting level. Containers past the depth bound collapse to null.
pub fn sanitize_json(value: &Value) -> Value {
    prune(value, 0)
}

fn prune(value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(map) => {
            if depth >= MAX_SANITIZE_DEPTH {
                return Value::Null;
            }
            Value::Object(
                map.iter()
                    .filter(|(key, _)| !BLOCKED_KEYS.contains(&key.as_str()))
                    .map(|(key, val)| (key.clone(), prune(val, depth + 1)))
                    .collect(),
            )
        }
        Value::Array(items) => {
            if depth >= MAX_SANITIZE_DEPTH {
                return Value::Null;
            }
            Value::Array(items.iter().map(|v| prune(v, depth + 1)).collect())
        }
        other => other.clone(),
    }
}

fn sanitize_links(links: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = links.into_iter().filter(|l| validate_url(l)).collect();
    out.truncate(MAX_MEDIA_LINKS);
    out
}

fn sanitize_string_list(items: Vec<String>, max_length: usize) -> Vec<String> {
    let mut out: Vec<String> = items
        .into_iter()
        .map(|s| sanitize_text(&s, max_length))
        .filter(|s| !s.is_empty())
        .collect();
    out.truncate(MAX_LIST_ITEMS);
    out
}

fn sanitize_note(note: Option<String>) -> Option<String> {
    note.map(|s| sanitize_text(&s, MAX_TEXT_LENGTH))
        .filter(|s| !s.is_empty())
}

fn sanitize_explanation(explanation: Explanation) -> Explanation {
    match explanation {
        Explanation::Plain(text) => Explanation::Plain(sanitize_text(&text, MAX_TEXT_LENGTH)),
        Explanation::Bilingual {
            primary_language,
            secondary_language,
        } => Explanation::Bilingual {
            primary_language: sanitize_text(&primary_language, MAX_TEXT_LENGTH),
            secondary_language: sanitize_text(&secondary_language, MAX_TEXT_LENGTH),
        },
    }
}

/// Clamps every free-text field, filters media links, and bounds every
/// array in a structurally valid lesson. Field order is fixed: title,
/// lead-in, presentation, controlled practice, free practice, metadata.
pub fn sanitize_lesson(mut lesson: Lesson) -> Lesson {
    lesson.title = sanitize_text(&lesson.title, MAX_TITLE);

    lesson.lead_in.title = sanitize_text(&lesson.lead_in.title, MAX_TITLE);
    lesson.lead_in.description = sanitize_text(&lesson.lead_in.description, MAX_DESCRIPTION);
    lesson.lead_in.text = sanitize_text(&lesson.lead_in.text, MAX_TEXT_LENGTH);
    lesson.lead_in.media_links = sanitize_links(std::mem::take(&mut lesson.lead_in.media_links));
    lesson.lead_in.teacher_notes = sanitize_note(lesson.lead_in.teacher_notes.take());

    lesson.presentation.title = sanitize_text(&lesson.presentation.title, MAX_TITLE);
    lesson.presentation.description =
        sanitize_text(&lesson.presentation.description, MAX_DESCRIPTION);
    lesson.presentation.target_language =
        sanitize_text(&lesson.presentation.target_language, MAX_DESCRIPTION);
    lesson.presentation.explanation =
        sanitize_explanation(std::mem::take(&mut lesson.presentation.explanation));
    lesson.presentation.examples = sanitize_string_list(
        std::mem::take(&mut lesson.presentation.examples),
        MAX_DESCRIPTION,
    );
    lesson.presentation.media_links =
        sanitize_links(std::mem::take(&mut lesson.presentation.media_links));
    lesson.presentation.teacher_notes = sanitize_note(lesson.presentation.teacher_notes.take());

    lesson.controlled_practice.exercises.truncate(MAX_ARRAY_LENGTH);
    lesson.controlled_practice.exercises = std::mem::take(&mut lesson.controlled_practice.exercises)
        .into_iter()
        .map(sanitize_exercise)
        .collect();

    lesson.free_practice.exercises.truncate(MAX_ARRAY_LENGTH);
    lesson.free_practice.exercises = std::mem::take(&mut lesson.free_practice.exercises)
        .into_iter()
        .map(sanitize_exercise)
        .collect();

    lesson.level = lesson
        .level
        .take()
        .map(|s| sanitize_text(&s, MAX_NAME))
        .filter(|s| !s.is_empty());
    lesson.objectives = sanitize_string_list(std::mem::take(&mut lesson.objectives), MAX_DESCRIPTION);
    lesson.materials = sanitize_string_list(std::mem::take(&mut lesson.materials), MAX_DESCRIPTION);
    lesson.cefr_level = lesson
        .cefr_level
        .take()
        .map(|s| sanitize_text(&s, 20))
        .filter(|s| !s.is_empty());

    lesson
}

/// Per-variant cleanup. Every kind gets its instruction and all of its
/// kind-specific text fields clamped, not just the deep-content kinds.
pub fn sanitize_exercise(exercise: Exercise) -> Exercise {
    match exercise {
        Exercise::GapFill(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.text = sanitize_text(&ex.text, MAX_TEXT_LENGTH);
            ex.answers = sanitize_string_list(std::mem::take(&mut ex.answers), MAX_NAME);
            Exercise::GapFill(ex)
        }
        Exercise::MultipleChoice(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.question = sanitize_text(&ex.question, MAX_DESCRIPTION);
            ex.options = sanitize_string_list(std::mem::take(&mut ex.options), MAX_DESCRIPTION);
            // An index past the surviving options is meaningless; drop it.
            ex.correct_option = ex.correct_option.filter(|i| *i < ex.options.len());
            Exercise::MultipleChoice(ex)
        }
        Exercise::TrueFalse(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.statements.truncate(MAX_LIST_ITEMS);
            for st in &mut ex.statements {
                st.text = sanitize_text(&st.text, MAX_DESCRIPTION);
            }
            ex.statements.retain(|st| !st.text.is_empty());
            Exercise::TrueFalse(ex)
        }
        Exercise::Matching(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.pairs = sanitize_pairs(std::mem::take(&mut ex.pairs));
            Exercise::Matching(ex)
        }
        Exercise::Sorting(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.categories = sanitize_string_list(std::mem::take(&mut ex.categories), MAX_NAME);
            ex.items.truncate(MAX_LIST_ITEMS);
            for item in &mut ex.items {
                item.text = sanitize_text(&item.text, MAX_DESCRIPTION);
                item.category = sanitize_text(&item.category, MAX_NAME);
            }
            ex.items.retain(|item| !item.text.is_empty());
            Exercise::Sorting(ex)
        }
        Exercise::SentenceScramble(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.sentences =
                sanitize_string_list(std::mem::take(&mut ex.sentences), MAX_DESCRIPTION);
            Exercise::SentenceScramble(ex)
        }
        Exercise::FreeText(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.prompt = sanitize_text(&ex.prompt, MAX_TEXT_LENGTH);
            Exercise::FreeText(ex)
        }
        Exercise::InformationGap(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.student_a = sanitize_text(&ex.student_a, MAX_TEXT_LENGTH);
            ex.student_b = sanitize_text(&ex.student_b, MAX_TEXT_LENGTH);
            Exercise::InformationGap(ex)
        }
        Exercise::RolePlay(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.scenario = sanitize_text(&ex.scenario, MAX_TEXT_LENGTH);
            ex.roles.truncate(MAX_ROLES);
            for role in &mut ex.roles {
                role.name = sanitize_text(&role.name, MAX_NAME);
                role.description = sanitize_text(&role.description, MAX_DESCRIPTION);
            }
            ex.roles.retain(|role| !role.name.is_empty());
            Exercise::RolePlay(ex)
        }
        Exercise::Collocation(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.pairs = sanitize_pairs(std::mem::take(&mut ex.pairs));
            Exercise::Collocation(ex)
        }
        Exercise::LexicalSet(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.topic = sanitize_text(&ex.topic, MAX_NAME);
            ex.words = sanitize_string_list(std::mem::take(&mut ex.words), MAX_NAME);
            Exercise::LexicalSet(ex)
        }
        Exercise::Ordering(mut ex) => {
            ex.instruction = sanitize_text(&ex.instruction, MAX_DESCRIPTION);
            ex.items = sanitize_string_list(std::mem::take(&mut ex.items), MAX_DESCRIPTION);
            Exercise::Ordering(ex)
        }
    }
}

fn sanitize_pairs(pairs: Vec<crate::model::MatchPair>) -> Vec<crate::model::MatchPair> {
    let mut out: Vec<crate::model::MatchPair> = pairs
        .into_iter()
        .map(|mut p| {
            p.left = sanitize_text(&p.left, MAX_DESCRIPTION);
            p.right = sanitize_text(&p.right, MAX_DESCRIPTION);
            p
        })
        .filter(|p| !p.left.is_empty() || !p.right.is_empty())
        .collect();
    out.truncate(MAX_LIST_ITEMS);
    out
}
