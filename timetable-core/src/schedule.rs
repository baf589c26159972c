//! Typed view of scheduling inputs and outputs.
//!
//! The wire contract stays opaque JSON; these types give the server (and
//! its tests) a structured reading of well-formed scheduling payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub id: String,
    /// e.g. "Monday"
    pub day: String,
    /// e.g. 800 (8:00)
    pub start: i32,
    /// e.g. 945 (9:45)
    pub end: i32,
    /// minutes
    pub duration: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub hours_per_week: f32,
    /// 1-5
    pub difficulty_level: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub size: i32,
    #[serde(default)]
    pub parent_group_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub capacity: i32,
    #[serde(default)]
    pub features: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    /// TimeBlock ids this teacher can take.
    #[serde(default)]
    pub available_time_blocks: Vec<String>,
}

/// One scheduled class: a subject taught by a teacher to a group, in a
/// room, at a time block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub subject_id: String,
    pub teacher_id: String,
    pub group_id: String,
    pub room_id: String,
    pub time_block_id: String,
}

/// Algorithm output: the solved timetable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub events: Vec<Event>,
}

/// Everything an algorithm needs to solve one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInput {
    pub time_blocks: Vec<TimeBlock>,
    pub subjects: Vec<Subject>,
    pub groups: Vec<Group>,
    pub rooms: Vec<Room>,
    pub teachers: Vec<Teacher>,
    /// Constraint payloads are algorithm-specific; kept as raw JSON.
    #[serde(default)]
    pub constraints: Vec<Value>,
}

impl ScheduleInput {
    pub fn summary(&self) -> String {
        format!(
            "{} time blocks, {} subjects, {} groups, {} rooms, {} teachers, {} constraints",
            self.time_blocks.len(),
            self.subjects.len(),
            self.groups.len(),
            self.rooms.len(),
            self.teachers.len(),
            self.constraints.len(),
        )
    }
}
