//! One-way migration from phase-based (v1) to activity-based (v2) lesson
//! documents, plus the batch helpers that operate on the persisted
//! collection blob. Everything here is pure; reading and writing the store
//! happens in the IPC handlers.

use serde::Serialize;
use serde_json::Value;

use crate::model::{
    Activity, ActivityKind, ActivityLesson, Exercise, ExerciseContent, Lesson, PracticeKind,
    PresentationContent, WarmUpContent, is_activity_lesson, ACTIVITY_LESSON_VERSION,
};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationError {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct MigrationOutcome {
    pub migrated: Vec<ActivityLesson>,
    pub already_migrated: usize,
    pub errors: Vec<MigrationError>,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStats {
    pub total: usize,
    pub phase_based: usize,
    pub activity_based: usize,
    pub migration_needed: bool,
}

/// Converts a v1 lesson into its v2 form. Deterministic: activity ids are
/// derived from the lesson id, and activity order is always warm-up,
/// presentation, controlled exercises, free exercises.
pub fn migrate_lesson(lesson: &Lesson) -> ActivityLesson {
    let mut activities = Vec::with_capacity(
        2 + lesson.controlled_practice.exercises.len() + lesson.free_practice.exercises.len(),
    );

    activities.push(Activity {
        id: format!("{}-warmup", lesson.id),
        title: lesson.lead_in.title.clone(),
        duration: lesson.lead_in.duration,
        tags: vec!["migrated".to_string(), "lead-in".to_string()],
        teacher_notes: lesson.lead_in.teacher_notes.clone(),
        kind: ActivityKind::WarmUp(WarmUpContent {
            description: lesson.lead_in.text.clone(),
            questions: if lesson.lead_in.description.trim().is_empty() {
                Vec::new()
            } else {
                vec![lesson.lead_in.description.clone()]
            },
            media_links: lesson.lead_in.media_links.clone(),
            duration: lesson.lead_in.duration,
        }),
    });

    activities.push(Activity {
        id: format!("{}-presentation", lesson.id),
        title: lesson.presentation.title.clone(),
        duration: lesson.presentation.duration,
        tags: vec!["migrated".to_string(), "presentation".to_string()],
        teacher_notes: lesson.presentation.teacher_notes.clone(),
        kind: ActivityKind::Presentation(PresentationContent {
            target_language: lesson.presentation.target_language.clone(),
            explanation: lesson.presentation.explanation.clone(),
            examples: lesson.presentation.examples.clone(),
            media_links: lesson.presentation.media_links.clone(),
            duration: lesson.presentation.duration,
        }),
    });

    for (i, exercise) in lesson.controlled_practice.exercises.iter().enumerate() {
        activities.push(exercise_activity(&lesson.id, exercise, i, PracticeKind::Controlled));
    }
    for (i, exercise) in lesson.free_practice.exercises.iter().enumerate() {
        activities.push(exercise_activity(&lesson.id, exercise, i, PracticeKind::Free));
    }

    let summed: u32 = activities.iter().map(|a| a.duration.unwrap_or(0)).sum();
    // Legacy lessons often recorded only an aggregate duration.
    let total_duration = if summed == 0 {
        lesson.duration.unwrap_or(0)
    } else {
        summed
    };

    ActivityLesson {
        id: lesson.id.clone(),
        title: lesson.title.clone(),
        version: ACTIVITY_LESSON_VERSION,
        activities,
        total_duration,
        tags: vec![lesson.structure.as_str().to_string()],
        created_at: lesson.created_at.clone(),
        level: lesson.level.clone(),
        objectives: lesson.objectives.clone(),
        materials: lesson.materials.clone(),
        cefr_level: lesson.cefr_level.clone(),
    }
}

fn exercise_activity(
    lesson_id: &str,
    exercise: &Exercise,
    index: usize,
    practice: PracticeKind,
) -> Activity {
    let ordinal = index + 1;
    let (title_prefix, practice_tag) = match practice {
        PracticeKind::Controlled => ("Controlled Practice", "controlled"),
        PracticeKind::Free => ("Free Practice", "free"),
    };
    Activity {
        id: format!("{}-{}-{}", lesson_id, practice_tag, ordinal),
        title: format!("{} {}: {}", title_prefix, ordinal, exercise.type_label()),
        duration: None,
        tags: vec![
            "migrated".to_string(),
            practice_tag.to_string(),
            exercise.type_tag().to_string(),
        ],
        teacher_notes: None,
        kind: ActivityKind::Exercise(ExerciseContent {
            exercise: exercise.clone(),
            practice_type: practice,
        }),
    }
}

/// Runs the migration over a serialized collection. Entries that already
/// carry the v2 marker are skipped, so running twice is a no-op for them.
/// A failing entry is recorded by index and never aborts the batch. An
/// unparseable blob reads as an empty collection.
pub fn migrate_stored_lessons(raw: &str) -> MigrationOutcome {
    let entries: Vec<Value> = serde_json::from_str(raw).unwrap_or_default();
    let mut outcome = MigrationOutcome::default();

    for (index, entry) in entries.into_iter().enumerate() {
        if is_activity_lesson(&entry) {
            outcome.already_migrated += 1;
            continue;
        }
        match serde_json::from_value::<Lesson>(entry) {
            Ok(lesson) => outcome.migrated.push(migrate_lesson(&lesson)),
            Err(e) => outcome.errors.push(MigrationError {
                index,
                message: e.to_string(),
            }),
        }
    }

    outcome
}

/// Replace-by-id merge of migrated lessons into the existing collection
/// blob. Entries whose id matches a migrated lesson are replaced; all
/// others, including already-v2 entries, are left untouched. With no
/// existing collection the migrated set is written directly.
pub fn merge_migrated_lessons(
    existing_raw: Option<&str>,
    migrated: &[ActivityLesson],
) -> anyhow::Result<String> {
    let mut replacements: Vec<(String, Value, bool)> = Vec::with_capacity(migrated.len());
    for lesson in migrated {
        let value = serde_json::to_value(lesson)?;
        replacements.push((lesson.id.clone(), value, false));
    }

    let Some(raw) = existing_raw else {
        let values: Vec<Value> = replacements.into_iter().map(|(_, v, _)| v).collect();
        return Ok(serde_json::to_string(&values)?);
    };

    let existing: Vec<Value> = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("stored lesson collection is not valid JSON: {}", e))?;

    let mut merged = Vec::with_capacity(existing.len());
    for entry in existing {
        let replacement = entry
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| {
                replacements
                    .iter_mut()
                    .find(|(rid, _, _)| rid == id)
                    .map(|slot| {
                        slot.2 = true;
                        slot.1.clone()
                    })
            });
        merged.push(replacement.unwrap_or(entry));
    }
    for (_, value, used) in replacements {
        if !used {
            merged.push(value);
        }
    }

    Ok(serde_json::to_string(&merged)?)
}

/// Read-only v1/v2 counts over the collection blob. A missing or
/// unparseable collection reads as zero lessons with nothing to migrate.
pub fn collection_stats(raw: Option<&str>) -> MigrationStats {
    let entries: Vec<Value> = raw
        .and_then(|r| serde_json::from_str(r).ok())
        .unwrap_or_default();
    let activity_based = entries.iter().filter(|e| is_activity_lesson(e)).count();
    let phase_based = entries.len() - activity_based;
    MigrationStats {
        total: entries.len(),
        phase_based,
        activity_based,
        migration_needed: phase_based > 0,
    }
}

pub fn is_migration_needed(raw: Option<&str>) -> bool {
    collection_stats(raw).migration_needed
}
