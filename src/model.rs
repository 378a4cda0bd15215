//! Lesson document model: the v1 phase-based `Lesson`, the v2 activity-based
//! `ActivityLesson`, and the exercise/activity unions shared between them.
//!
//! JSON field names are camelCase and variant tags are kebab-case to stay
//! wire-compatible with documents produced by earlier releases.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Version marker carried by every activity-based lesson document.
/// v1 documents predate the marker and never carry a `version` field.
pub const ACTIVITY_LESSON_VERSION: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Methodology {
    Ppp,
    Ttt,
    Tbl,
    Esa,
}

impl Methodology {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ppp" => Some(Self::Ppp),
            "ttt" => Some(Self::Ttt),
            "tbl" => Some(Self::Tbl),
            "esa" => Some(Self::Esa),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ppp => "ppp",
            Self::Ttt => "ttt",
            Self::Tbl => "tbl",
            Self::Esa => "esa",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PracticeKind {
    Controlled,
    Free,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GapFillExercise {
    pub id: String,
    pub instruction: String,
    /// Template text containing `___` gap markers.
    pub text: String,
    /// Expected answers in gap order.
    pub answers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultipleChoiceExercise {
    pub id: String,
    pub instruction: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_option: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrueFalseStatement {
    pub text: String,
    pub answer: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrueFalseExercise {
    pub id: String,
    pub instruction: String,
    pub statements: Vec<TrueFalseStatement>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchingExercise {
    pub id: String,
    pub instruction: String,
    pub pairs: Vec<MatchPair>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SortItem {
    pub text: String,
    pub category: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SortingExercise {
    pub id: String,
    pub instruction: String,
    pub categories: Vec<String>,
    pub items: Vec<SortItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SentenceScrambleExercise {
    pub id: String,
    pub instruction: String,
    pub sentences: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FreeTextExercise {
    pub id: String,
    pub instruction: String,
    pub prompt: String,
    pub min_words: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InformationGapExercise {
    pub id: String,
    pub instruction: String,
    /// Role sheet handed to student A.
    pub student_a: String,
    /// Role sheet handed to student B.
    pub student_b: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RolePlayRole {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RolePlayExercise {
    pub id: String,
    pub instruction: String,
    pub scenario: String,
    pub roles: Vec<RolePlayRole>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollocationExercise {
    pub id: String,
    pub instruction: String,
    pub pairs: Vec<MatchPair>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LexicalSetExercise {
    pub id: String,
    pub instruction: String,
    pub topic: String,
    pub words: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderingExercise {
    pub id: String,
    pub instruction: String,
    pub items: Vec<String>,
}

/// One practice item. Closed union: the `type` tag decides which payload
/// fields are present, and no variant shares fields with another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Exercise {
    GapFill(GapFillExercise),
    MultipleChoice(MultipleChoiceExercise),
    TrueFalse(TrueFalseExercise),
    Matching(MatchingExercise),
    Sorting(SortingExercise),
    SentenceScramble(SentenceScrambleExercise),
    FreeText(FreeTextExercise),
    InformationGap(InformationGapExercise),
    RolePlay(RolePlayExercise),
    Collocation(CollocationExercise),
    LexicalSet(LexicalSetExercise),
    Ordering(OrderingExercise),
}

impl Exercise {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::GapFill(_) => "gap-fill",
            Self::MultipleChoice(_) => "multiple-choice",
            Self::TrueFalse(_) => "true-false",
            Self::Matching(_) => "matching",
            Self::Sorting(_) => "sorting",
            Self::SentenceScramble(_) => "sentence-scramble",
            Self::FreeText(_) => "free-text",
            Self::InformationGap(_) => "information-gap",
            Self::RolePlay(_) => "role-play",
            Self::Collocation(_) => "collocation",
            Self::LexicalSet(_) => "lexical-set",
            Self::Ordering(_) => "ordering",
        }
    }

    /// Display label used in migrated activity titles.
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::GapFill(_) => "Gap Fill Exercise",
            Self::MultipleChoice(_) => "Multiple Choice",
            Self::TrueFalse(_) => "True or False",
            Self::Matching(_) => "Matching",
            Self::Sorting(_) => "Sorting",
            Self::SentenceScramble(_) => "Sentence Scramble",
            Self::FreeText(_) => "Free Text",
            Self::InformationGap(_) => "Information Gap",
            Self::RolePlay(_) => "Role Play",
            Self::Collocation(_) => "Collocations",
            Self::LexicalSet(_) => "Lexical Sets",
            Self::Ordering(_) => "Ordering",
        }
    }
}

/// Deserializes an exercise array while skipping entries that do not decode
/// as any known exercise variant. A broken entry drops out; it never fails
/// the containing lesson.
fn lenient_exercises<'de, D>(deserializer: D) -> Result<Vec<Exercise>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Value> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeSection {
    #[serde(rename = "type")]
    pub kind: PracticeKind,
    #[serde(default, deserialize_with = "lenient_exercises")]
    pub exercises: Vec<Exercise>,
}

impl PracticeSection {
    pub fn empty(kind: PracticeKind) -> Self {
        Self {
            kind,
            exercises: Vec::new(),
        }
    }
}

/// Presentation explanation: plain monolingual text, or a bilingual pair.
/// Consumers match on the variant; the wire shape is a bare string or an
/// object, as written by the authoring UI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Explanation {
    Plain(String),
    #[serde(rename_all = "camelCase")]
    Bilingual {
        primary_language: String,
        secondary_language: String,
    },
}

impl Default for Explanation {
    fn default() -> Self {
        Explanation::Plain(String::new())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeadIn {
    pub title: String,
    pub description: String,
    pub text: String,
    pub media_links: Vec<String>,
    pub duration: Option<u32>,
    pub teacher_notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Presentation {
    pub title: String,
    pub description: String,
    pub target_language: String,
    pub explanation: Explanation,
    pub examples: Vec<String>,
    pub media_links: Vec<String>,
    pub duration: Option<u32>,
    pub teacher_notes: Option<String>,
}

/// Phase-based lesson document (v1). Exactly one lead-in and one
/// presentation block; exercises live only inside the two practice
/// sections. Never carries a `version` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub structure: Methodology,
    pub lead_in: LeadIn,
    pub presentation: Presentation,
    pub controlled_practice: PracticeSection,
    pub free_practice: PracticeSection,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub materials: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cefr_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WarmUpContent {
    pub description: String,
    pub questions: Vec<String>,
    pub media_links: Vec<String>,
    pub duration: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresentationContent {
    pub target_language: String,
    pub explanation: Explanation,
    pub examples: Vec<String>,
    pub media_links: Vec<String>,
    pub duration: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseContent {
    pub exercise: Exercise,
    pub practice_type: PracticeKind,
}

/// Activity payload, discriminated by the `type` tag at the activity level
/// with the payload under `content`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "kebab-case")]
pub enum ActivityKind {
    WarmUp(WarmUpContent),
    Presentation(PresentationContent),
    Exercise(ExerciseContent),
}

/// One unit inside an activity-based lesson.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_notes: Option<String>,
    #[serde(flatten)]
    pub kind: ActivityKind,
}

/// Activity-based lesson document (v2). The `version` marker is the sole
/// discriminant against v1 when loading a document of unknown shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLesson {
    pub id: String,
    pub title: String,
    pub version: u32,
    pub activities: Vec<Activity>,
    pub total_duration: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub materials: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cefr_level: Option<String>,
}

/// True iff the value carries the explicit v2 version marker. Field
/// presence is never consulted; a document without the marker is v1 even
/// if it happens to contain an `activities` array.
pub fn is_activity_lesson(value: &Value) -> bool {
    value.get("version").and_then(Value::as_u64) == Some(ACTIVITY_LESSON_VERSION as u64)
}

/// A stored document of either version, decoded by consulting the version
/// marker first.
#[derive(Clone, Debug, PartialEq)]
pub enum LessonDocument {
    Phase(Lesson),
    Activity(ActivityLesson),
}

impl LessonDocument {
    pub fn id(&self) -> &str {
        match self {
            Self::Phase(l) => &l.id,
            Self::Activity(l) => &l.id,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Self::Phase(_) => 1,
            Self::Activity(_) => ACTIVITY_LESSON_VERSION,
        }
    }
}

impl Serialize for LessonDocument {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Phase(l) => l.serialize(serializer),
            Self::Activity(l) => l.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for LessonDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if is_activity_lesson(&value) {
            serde_json::from_value(value)
                .map(LessonDocument::Activity)
                .map_err(serde::de::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(LessonDocument::Phase)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exercise_type_tag_at_top_level() {
        let ex = Exercise::GapFill(GapFillExercise {
            id: "ex1".to_string(),
            instruction: "Fill the gaps".to_string(),
            text: "I ___ to school".to_string(),
            answers: vec!["go".to_string()],
        });
        let value = serde_json::to_value(&ex).expect("to_value");
        assert_eq!(value["type"], "gap-fill");
        assert_eq!(value["answers"][0], "go");
    }

    #[test]
    fn exercise_round_trips_through_json() {
        let ex = Exercise::MultipleChoice(MultipleChoiceExercise {
            id: "ex2".to_string(),
            instruction: "Pick one".to_string(),
            question: "He ___ tennis".to_string(),
            options: vec!["play".to_string(), "plays".to_string()],
            correct_option: Some(1),
        });
        let text = serde_json::to_string(&ex).expect("serialize");
        let back: Exercise = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(ex, back);
    }

    #[test]
    fn exercise_decodes_with_missing_kind_fields() {
        let ex: Exercise =
            serde_json::from_value(json!({ "type": "role-play", "id": "ex3" })).expect("decode");
        match ex {
            Exercise::RolePlay(rp) => {
                assert_eq!(rp.id, "ex3");
                assert!(rp.roles.is_empty());
            }
            other => panic!("expected role-play, got {:?}", other),
        }
    }

    #[test]
    fn lenient_exercises_skip_undecodable_entries() {
        let section: PracticeSection = serde_json::from_value(json!({
            "type": "controlled",
            "exercises": [
                { "type": "ordering", "id": "a", "items": ["x", "y"] },
                { "type": "no-such-kind", "id": "b" },
                { "type": "ordering", "id": "c", "items": 42 },
                { "type": "matching", "id": "d", "pairs": [{ "left": "hot", "right": "cold" }] }
            ]
        }))
        .expect("decode section");
        let ids: Vec<&str> = section
            .exercises
            .iter()
            .map(|e| match e {
                Exercise::Ordering(x) => x.id.as_str(),
                Exercise::Matching(x) => x.id.as_str(),
                other => panic!("unexpected variant {:?}", other),
            })
            .collect();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[test]
    fn explanation_decodes_both_shapes() {
        let plain: Explanation = serde_json::from_value(json!("present simple")).expect("plain");
        assert_eq!(plain, Explanation::Plain("present simple".to_string()));

        let pair: Explanation = serde_json::from_value(json!({
            "primaryLanguage": "the present simple",
            "secondaryLanguage": "el presente simple"
        }))
        .expect("bilingual");
        match pair {
            Explanation::Bilingual {
                primary_language,
                secondary_language,
            } => {
                assert_eq!(primary_language, "the present simple");
                assert_eq!(secondary_language, "el presente simple");
            }
            other => panic!("expected bilingual, got {:?}", other),
        }
    }

    #[test]
    fn version_marker_is_authoritative() {
        assert!(is_activity_lesson(&json!({ "version": 2, "activities": [] })));
        assert!(!is_activity_lesson(&json!({ "version": 1 })));
        assert!(!is_activity_lesson(&json!({ "version": "2" })));
        // A hostile payload injecting an activities array does not make a
        // marker-less document v2.
        assert!(!is_activity_lesson(&json!({
            "id": "x",
            "activities": [{ "type": "warm-up" }]
        })));
        assert!(!is_activity_lesson(&json!(null)));
    }

    #[test]
    fn lesson_document_decodes_by_marker() {
        let v2: LessonDocument = serde_json::from_value(json!({
            "id": "l2",
            "title": "Travel",
            "version": 2,
            "activities": [],
            "totalDuration": 0
        }))
        .expect("decode v2");
        assert_eq!(v2.version(), 2);
        assert_eq!(v2.id(), "l2");

        let v1: LessonDocument = serde_json::from_value(json!({
            "id": "l1",
            "title": "Food",
            "structure": "ppp",
            "leadIn": {},
            "presentation": {},
            "controlledPractice": { "type": "controlled", "exercises": [] },
            "freePractice": { "type": "free", "exercises": [] }
        }))
        .expect("decode v1");
        assert_eq!(v1.version(), 1);
        assert_eq!(v1.id(), "l1");
    }

    #[test]
    fn activity_kind_tag_and_content_are_separate_keys() {
        let activity = Activity {
            id: "a1".to_string(),
            title: "Warm up".to_string(),
            duration: Some(5),
            tags: vec!["migrated".to_string()],
            teacher_notes: None,
            kind: ActivityKind::WarmUp(WarmUpContent {
                description: "Talk about holidays".to_string(),
                questions: vec![],
                media_links: vec![],
                duration: Some(5),
            }),
        };
        let value = serde_json::to_value(&activity).expect("to_value");
        assert_eq!(value["type"], "warm-up");
        assert_eq!(value["content"]["description"], "Talk about holidays");
        assert!(value["content"].get("type").is_none());
    }
}
