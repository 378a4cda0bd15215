//! Structural gate run on parsed JSON before it is treated as a lesson.
//! Shape-only: exercise-variant field correctness is handled later by the
//! lenient per-exercise decoder.

use serde_json::{Map, Value};

use crate::model::Methodology;
use crate::security::validate_array_length;

/// True iff `data` has the overall shape of a phase-based lesson. Checks
/// stop at the first violation; this never panics on any input.
pub fn validate_lesson_structure(data: &Value) -> bool {
    let Some(obj) = data.as_object() else {
        return false;
    };
    if !obj.contains_key("id") || !obj.contains_key("title") {
        return false;
    }
    let Some(tag) = obj.get("structure").and_then(Value::as_str) else {
        return false;
    };
    if Methodology::parse(tag).is_none() {
        return false;
    }
    if !content_block_ok(obj, "leadIn") || !content_block_ok(obj, "presentation") {
        return false;
    }
    practice_section_ok(obj, "controlledPractice") && practice_section_ok(obj, "freePractice")
}

fn content_block_ok(obj: &Map<String, Value>, key: &str) -> bool {
    let Some(block) = obj.get(key).and_then(Value::as_object) else {
        return false;
    };
    // Link-level URL validity is the sanitizer's job; here only the shape.
    match block.get("mediaLinks") {
        None => true,
        Some(links) => links.is_array(),
    }
}

fn practice_section_ok(obj: &Map<String, Value>, key: &str) -> bool {
    let Some(section) = obj.get(key).and_then(Value::as_object) else {
        return false;
    };
    let Some(exercises) = section.get("exercises").and_then(Value::as_array) else {
        return false;
    };
    validate_array_length(exercises)
}
