//! Slide generation jobs of the course backend
//!
//! Generation runs in the background on the server. The start call answers
//! `204 No Content` right away, and the owning course carries an `is_working`
//! flag until the job finishes, so every job polls its course record no
//! matter which entity it was started for.

use crate::types::{EntityId, JobSpec};
use serde::{Deserialize, Serialize};

/// Filename used when the server does not name the presentation
pub const FALLBACK_SLIDES_FILENAME: &str = "slides.pptx";

/// What a generation job produces slides for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SlideTarget {
    /// One section
    Section(i64),
    /// Every section of a lesson
    Lesson(i64),
    /// Every lesson of the course
    Course,
}

/// Slide generation for a target within a course
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Course the target belongs to; its record is polled for completion
    pub course_id: i64,
    /// What to generate slides for
    pub target: SlideTarget,
}

impl GenerationJob {
    /// Slides for one section
    pub fn section(course_id: i64, section_id: i64) -> Self {
        Self {
            course_id,
            target: SlideTarget::Section(section_id),
        }
    }

    /// Slides for a whole lesson
    pub fn lesson(course_id: i64, lesson_id: i64) -> Self {
        Self {
            course_id,
            target: SlideTarget::Lesson(lesson_id),
        }
    }

    /// Slides for the whole course
    pub fn course(course_id: i64) -> Self {
        Self {
            course_id,
            target: SlideTarget::Course,
        }
    }

    /// Entity the generation is keyed by
    pub fn entity_id(&self) -> EntityId {
        match self.target {
            SlideTarget::Section(id) | SlideTarget::Lesson(id) => EntityId(id),
            SlideTarget::Course => EntityId(self.course_id),
        }
    }

    fn target_path(&self) -> String {
        match self.target {
            SlideTarget::Section(id) => format!("sections/{id}"),
            SlideTarget::Lesson(id) => format!("lessons/{id}"),
            SlideTarget::Course => format!("courses/{}", self.course_id),
        }
    }

    /// `POST` path that starts the generation
    pub fn start_path(&self) -> String {
        format!("{}/slides", self.target_path())
    }

    /// `GET` path of the course record carrying `is_working`
    pub fn status_path(&self) -> String {
        format!("courses/{}", self.course_id)
    }

    /// `GET` path of the generated presentation
    pub fn artifact_path(&self) -> String {
        format!("{}/slides/pptx", self.target_path())
    }

    /// Message surfaced once the server accepted the job
    pub fn message(&self) -> String {
        match self.target {
            SlideTarget::Section(id) => format!("Generating slides for section {id}"),
            SlideTarget::Lesson(id) => format!("Generating slides for lesson {id}"),
            SlideTarget::Course => format!("Generating slides for course {}", self.course_id),
        }
    }

    /// Everything the orchestrator needs to run this job
    pub fn spec(&self) -> JobSpec {
        JobSpec {
            entity_id: self.entity_id(),
            start_path: self.start_path(),
            poll_path: self.status_path(),
            message: self.message(),
            body: None,
        }
    }
}

/// Response of `GET courses/{id}/has-slides`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HasSlides {
    /// At least one section of the course has slides
    pub has_slides: bool,
}
