/// Types for PVK course data
use crate::overlap::Timespan;
use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! impl_record {
    ($($ty:ty),*) => {
        $(
            impl Record for $ty {
                fn id(&self) -> Option<&str> {
                    self.id.as_deref()
                }

                fn etag(&self) -> Option<&str> {
                    self.etag.as_deref()
                }
            }
        )*
    };
}

impl_record!(Lecture, Course, Selection, Signup, Payment);

/// A lecture that preparation courses are offered for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lecture {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    pub title: String,

    /// e.g. "itet", "mavt"
    pub department: String,

    /// Year of study (1-3)
    pub year: u8,

    /// `nethz` of the assistants
    #[serde(default)]
    pub assistants: Vec<String>,
}

/// Reference from a course to its lecture, either by id or embedded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LectureRef {
    Id(String),
    Embedded(Box<Lecture>),
}

impl LectureRef {
    pub fn id(&self) -> Option<&str> {
        match self {
            LectureRef::Id(id) => Some(id.as_str()),
            LectureRef::Embedded(lecture) => lecture.id.as_deref(),
        }
    }
}

/// A single course (one assistant, one room, a set of time slots)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lecture: Option<LectureRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant: Option<String>,

    /// Window during which students may sign up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signup: Option<Timespan>,

    /// Time slots the course takes place in
    #[serde(default)]
    pub datetimes: Vec<Timespan>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,

    #[serde(default)]
    pub spots: u32,
}

impl Course {
    /// Returns true if `now` lies within the course's sign-up window.
    pub fn is_signup_open(&self, now: DateTime<Utc>) -> bool {
        self.signup.is_some_and(|window| window.contains(now))
    }

    /// Title of the lecture, if it was embedded in the response.
    pub fn lecture_title(&self) -> Option<&str> {
        match &self.lecture {
            Some(LectureRef::Embedded(lecture)) => Some(lecture.title.as_str()),
            _ => None,
        }
    }
}

/// A user's tentative choice of a course, made before sign-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    pub nethz: String,

    /// Id of the selected course
    pub course: String,
}

impl Selection {
    /// A selection that has not been sent to the server yet.
    pub fn draft(nethz: impl Into<String>, course: impl Into<String>) -> Self {
        Self {
            id: None,
            etag: None,
            nethz: nethz.into(),
            course: course.into(),
        }
    }
}

/// Where a signup stands. The server assigns it; clients never send it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignupStatus {
    /// On the waiting list
    #[default]
    #[serde(rename = "waiting", alias = "pending")]
    Pending,
    /// A spot is held for the user until payment
    Reserved,
    /// Paid
    Accepted,
}

impl SignupStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, SignupStatus::Pending)
    }
}

impl std::fmt::Display for SignupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SignupStatus::Pending => "waiting",
            SignupStatus::Reserved => "reserved",
            SignupStatus::Accepted => "accepted",
        };
        f.write_str(label)
    }
}

/// A user's signup for a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signup {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    pub nethz: String,

    /// Id of the course signed up for
    pub course: String,

    #[serde(default, skip_serializing_if = "SignupStatus::is_pending")]
    pub status: SignupStatus,
}

impl Signup {
    /// A signup that has not been sent to the server yet.
    pub fn draft(nethz: impl Into<String>, course: impl Into<String>) -> Self {
        Self {
            id: None,
            etag: None,
            nethz: nethz.into(),
            course: course.into(),
            status: SignupStatus::Pending,
        }
    }
}

/// A payment for a set of reserved signups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Ids of the signups paid for
    pub signups: Vec<String>,

    /// Payment provider token; admins may pay without one
    #[serde(default)]
    pub token: Option<String>,

    /// Set by the backend once the charge went through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_id: Option<String>,

    /// Charged amount in the smallest currency unit, set by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
}
