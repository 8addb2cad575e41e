use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Paying customer who owns the booking and the balance.
    CustomerId
);
string_id!(
    /// Optional dog attached to a booking or a progression track.
    DogId
);
string_id!(TrainerId);
string_id!(AppointmentId);
string_id!(BookingId);
string_id!(AchievementId);
string_id!(LevelId);
string_id!(RequirementId);
string_id!(
    /// Training type that produces achievements and carries a default price.
    SourceId
);

/// Unit of progression: a customer alone, or a customer together with one dog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject {
    pub customer_id: CustomerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dog_id: Option<DogId>,
}

impl Subject {
    pub fn new(customer_id: CustomerId, dog_id: Option<DogId>) -> Self {
        Self {
            customer_id,
            dog_id,
        }
    }

    pub fn customer(customer_id: impl Into<String>) -> Self {
        Self::new(CustomerId::new(customer_id), None)
    }

    pub fn with_dog(customer_id: impl Into<String>, dog_id: impl Into<String>) -> Self {
        Self::new(CustomerId::new(customer_id), Some(DogId::new(dog_id)))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dog_id {
            Some(dog) => write!(f, "{}/{}", self.customer_id, dog),
            None => write!(f, "{}", self.customer_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    Main,
    Additional,
}

impl RequirementKind {
    pub fn label(&self) -> &'static str {
        match self {
            RequirementKind::Main => "main",
            RequirementKind::Additional => "additional",
        }
    }
}

/// Countable prerequisite tied to a level and fed by one training type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: RequirementId,
    pub level_id: LevelId,
    pub kind: RequirementKind,
    pub required_count: u32,
    pub source_id: SourceId,
}

impl Requirement {
    pub fn is_gating(&self) -> bool {
        self.kind == RequirementKind::Main
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: LevelId,
    pub rank: u32,
    pub name: String,
    /// Terminal level completed by a license grant instead of a level-up.
    #[serde(default)]
    pub license: bool,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl Level {
    pub fn main_requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.iter().filter(|req| req.is_gating())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingType {
    pub source_id: SourceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_price_cents: Option<i64>,
}

/// One completed instance of a training type, appended at billing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: AchievementId,
    pub customer_id: CustomerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dog_id: Option<DogId>,
    pub source_id: SourceId,
    pub date_achieved: DateTime<Utc>,
    pub is_consumed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<BookingId>,
}

impl Achievement {
    pub fn subject(&self) -> Subject {
        Subject::new(self.customer_id.clone(), self.dog_id.clone())
    }
}

/// Who may book an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Audience {
    OpenForAll,
    Levels { level_ids: Vec<LevelId> },
}

impl Audience {
    pub fn admits(&self, level: Option<&LevelId>) -> bool {
        match self {
            Audience::OpenForAll => true,
            Audience::Levels { level_ids } => {
                level.is_some_and(|current| level_ids.iter().any(|id| id == current))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub capacity: u32,
    pub trainer_id: TrainerId,
    pub audience: Audience,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
    /// Per-appointment override of the training type's default price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_cents: Option<i64>,
    pub start_time: DateTime<Utc>,
}

/// Appointment fields supplied by staff; the engine assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub capacity: u32,
    pub trainer_id: TrainerId,
    pub audience: Audience,
    #[serde(default)]
    pub source_id: Option<SourceId>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Waitlist,
    Cancelled,
}

impl BookingStatus {
    pub fn label(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Waitlist => "waitlist",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub appointment_id: AppointmentId,
    pub customer_id: CustomerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dog_id: Option<DogId>,
    pub status: BookingStatus,
    pub attended: bool,
    pub is_billed: bool,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn subject(&self) -> Subject {
        Subject::new(self.customer_id.clone(), self.dog_id.clone())
    }

    pub fn belongs_to(&self, subject: &Subject) -> bool {
        self.customer_id == subject.customer_id && self.dog_id == subject.dog_id
    }
}

/// Time source for booking and achievement timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
