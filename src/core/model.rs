//! Domain model: requests, categories, resource kinds and descriptors.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::util::serde::{RequestId, RequesterId, ResourceId, Urgency};

/// Treatment category of a request. Drives which resource kinds it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// General consultation.
    Consultation,
    /// Routine checkup.
    Checkup,
    /// Emergency care; needs an ECG.
    Emergency,
    /// Surgery; needs a ventilator and a surgeon.
    Surgery,
    /// X-ray imaging.
    Xray,
    /// MRI imaging.
    Mri,
    /// CT scan.
    CtScan,
    /// Cardiology; needs a cardiologist.
    Cardiology,
    /// Neurology; needs a neurologist.
    Neurology,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Consultation,
        Self::Checkup,
        Self::Emergency,
        Self::Surgery,
        Self::Xray,
        Self::Mri,
        Self::CtScan,
        Self::Cardiology,
        Self::Neurology,
    ];

    /// Equipment this category requires, if any.
    pub const fn required_equipment(self) -> Option<EquipmentKind> {
        match self {
            Self::Xray => Some(EquipmentKind::Xray),
            Self::Mri => Some(EquipmentKind::Mri),
            Self::CtScan => Some(EquipmentKind::CtScan),
            Self::Surgery => Some(EquipmentKind::Ventilator),
            Self::Emergency => Some(EquipmentKind::Ecg),
            Self::Consultation | Self::Checkup | Self::Cardiology | Self::Neurology => None,
        }
    }

    /// Resource kinds to acquire, in negotiation order: doctor, room, then
    /// equipment when required.
    pub fn required_kinds(self) -> Vec<ResourceKind> {
        let mut kinds = vec![ResourceKind::Doctor, ResourceKind::Room];
        if let Some(equipment) = self.required_equipment() {
            kinds.push(ResourceKind::Equipment(equipment));
        }
        kinds
    }

    /// Expected treatment duration.
    pub const fn estimated_duration(self) -> Duration {
        let minutes = match self {
            Self::Consultation => 15,
            Self::Emergency => 30,
            Self::Surgery => 120,
            Self::Checkup => 20,
            Self::Xray => 10,
            Self::Mri => 45,
            Self::CtScan | Self::Cardiology | Self::Neurology => 30,
        };
        Duration::from_secs(minutes * 60)
    }

    /// Canonical upper-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Consultation => "CONSULTATION",
            Self::Checkup => "CHECKUP",
            Self::Emergency => "EMERGENCY",
            Self::Surgery => "SURGERY",
            Self::Xray => "XRAY",
            Self::Mri => "MRI",
            Self::CtScan => "CT_SCAN",
            Self::Cardiology => "CARDIOLOGY",
            Self::Neurology => "NEUROLOGY",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == upper)
            .ok_or_else(|| format!("unknown category `{s}`"))
    }
}

/// Kind of equipment unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentKind {
    /// X-ray machine.
    Xray,
    /// MRI scanner.
    Mri,
    /// CT scanner.
    CtScan,
    /// Ventilator.
    Ventilator,
    /// Electrocardiograph.
    Ecg,
}

impl EquipmentKind {
    /// Every equipment kind.
    pub const ALL: [Self; 5] = [Self::Xray, Self::Mri, Self::CtScan, Self::Ventilator, Self::Ecg];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Xray => "xray",
            Self::Mri => "mri",
            Self::CtScan => "ct_scan",
            Self::Ventilator => "ventilator",
            Self::Ecg => "ecg",
        }
    }
}

/// Kind of resource a request binds. Also the directory capability key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Member of staff.
    Doctor,
    /// Treatment room.
    Room,
    /// Device of a given type.
    Equipment(EquipmentKind),
}

impl ResourceKind {
    /// Every kind the directory can be asked about.
    pub fn all() -> Vec<Self> {
        let mut kinds = vec![Self::Doctor, Self::Room];
        kinds.extend(EquipmentKind::ALL.into_iter().map(Self::Equipment));
        kinds
    }

    /// Directory capability name, e.g. `doctor-service` or `equipment-service/mri`.
    pub fn capability(self) -> String {
        match self {
            Self::Doctor => "doctor-service".into(),
            Self::Room => "room-service".into(),
            Self::Equipment(kind) => format!("equipment-service/{}", kind.as_str()),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Doctor => f.write_str("doctor"),
            Self::Room => f.write_str("room"),
            Self::Equipment(kind) => write!(f, "equipment:{}", kind.as_str()),
        }
    }
}

/// Doctor specialisation, used by resource gates to refuse unsuitable work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Specialization {
    /// Suits every category.
    General,
    /// Surgery.
    Surgeon,
    /// Emergency care.
    Emergency,
    /// Cardiology.
    Cardiologist,
    /// Neurology.
    Neurologist,
}

impl Specialization {
    /// Whether a doctor with this specialisation can take the category.
    pub const fn suits(self, category: Category) -> bool {
        if matches!(self, Self::General) {
            return true;
        }
        match category {
            Category::Surgery => matches!(self, Self::Surgeon),
            Category::Emergency => matches!(self, Self::Emergency),
            Category::Cardiology => matches!(self, Self::Cardiologist),
            Category::Neurology => matches!(self, Self::Neurologist),
            _ => true,
        }
    }
}

/// Lifecycle status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Queued or being negotiated.
    Waiting,
    /// Every required resource is bound.
    InProgress,
    /// Treatment finished and resources released.
    Completed,
}

impl RequestStatus {
    /// Upper-case name used in errors and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }
}

/// Resource ids bound to a request, at most one per kind slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bindings {
    /// Bound doctor.
    pub doctor: Option<ResourceId>,
    /// Bound room.
    pub room: Option<ResourceId>,
    /// Bound equipment unit.
    pub equipment: Option<ResourceId>,
}

impl Bindings {
    fn slot(&self, kind: ResourceKind) -> &Option<ResourceId> {
        match kind {
            ResourceKind::Doctor => &self.doctor,
            ResourceKind::Room => &self.room,
            ResourceKind::Equipment(_) => &self.equipment,
        }
    }

    fn slot_mut(&mut self, kind: ResourceKind) -> &mut Option<ResourceId> {
        match kind {
            ResourceKind::Doctor => &mut self.doctor,
            ResourceKind::Room => &mut self.room,
            ResourceKind::Equipment(_) => &mut self.equipment,
        }
    }

    /// Resource bound for a kind.
    pub fn get(&self, kind: ResourceKind) -> Option<&ResourceId> {
        self.slot(kind).as_ref()
    }

    /// Whether every kind in `kinds` is bound.
    pub fn covers(&self, kinds: &[ResourceKind]) -> bool {
        kinds.iter().all(|k| self.slot(*k).is_some())
    }

    /// Bound (kind slot, id) pairs. Equipment is reported with the kind passed
    /// in `equipment_kind` since the slot itself is untyped.
    pub fn bound(&self, equipment_kind: Option<EquipmentKind>) -> Vec<(ResourceKind, ResourceId)> {
        let mut out = Vec::with_capacity(3);
        if let Some(id) = &self.doctor {
            out.push((ResourceKind::Doctor, id.clone()));
        }
        if let Some(id) = &self.room {
            out.push((ResourceKind::Room, id.clone()));
        }
        if let (Some(id), Some(kind)) = (&self.equipment, equipment_kind) {
            out.push((ResourceKind::Equipment(kind), id.clone()));
        }
        out
    }

    /// Clear every slot.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Where the request stood when it was dispatched. Feeds the wait-time model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispatchContext {
    /// Queue length at dispatch, including this request.
    pub queue_len: usize,
    /// Share of doctors that confirmed availability, 0.0 to 1.0.
    pub availability: f64,
}

/// A request for a set of resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique id.
    pub id: RequestId,
    /// Who receives the allocation notice.
    pub requester: RequesterId,
    /// Treatment category.
    pub category: Category,
    /// Urgency, 1 to 5.
    pub urgency: Urgency,
    /// Arrival time in milliseconds since epoch.
    pub arrival_ms: u128,
    /// Lifecycle status.
    pub status: RequestStatus,
    /// Bound resources.
    pub bindings: Bindings,
    /// Negotiations run so far.
    pub attempts: u32,
    /// Time spent waiting, recorded when the request goes in progress.
    pub waiting_ms: Option<u128>,
    /// Queue and availability snapshot from the last dispatch.
    pub dispatch: Option<DispatchContext>,
}

impl Request {
    /// Create a waiting request.
    pub fn new(
        id: RequestId,
        requester: impl Into<RequesterId>,
        category: Category,
        urgency: Urgency,
        arrival_ms: u128,
    ) -> Self {
        Self {
            id,
            requester: requester.into(),
            category,
            urgency,
            arrival_ms,
            status: RequestStatus::Waiting,
            bindings: Bindings::default(),
            attempts: 0,
            waiting_ms: None,
            dispatch: None,
        }
    }

    /// Resource kinds this request needs.
    pub fn required_kinds(&self) -> Vec<ResourceKind> {
        self.category.required_kinds()
    }

    /// Bind a resource for a kind. Refuses a second resource of the same kind.
    pub fn bind(&mut self, kind: ResourceKind, resource: ResourceId) -> Result<(), EngineError> {
        let slot = self.bindings.slot_mut(kind);
        if let Some(existing) = slot {
            return Err(EngineError::AlreadyBound {
                request: self.id,
                kind: kind.to_string(),
                resource: existing.clone(),
            });
        }
        *slot = Some(resource);
        Ok(())
    }

    /// Whether every required kind is bound.
    pub fn fully_bound(&self) -> bool {
        self.bindings.covers(&self.required_kinds())
    }

    /// Bound resources with their kinds.
    pub fn bound_resources(&self) -> Vec<(ResourceKind, ResourceId)> {
        self.bindings.bound(self.category.required_equipment())
    }

    /// Reporting score: `urgency * 10 + minutes waited`.
    pub fn priority_score(&self, now_ms: u128) -> f64 {
        let waited = now_ms.saturating_sub(self.arrival_ms) as f64 / 60_000.0;
        f64::from(self.urgency.level()) * 10.0 + waited
    }
}

/// Cached view of a single resource unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource id.
    pub id: ResourceId,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Nominal capacity (beds in a room, 1 for staff and devices).
    pub capacity: u32,
    /// Whether the unit accepts a new allocation.
    pub available: bool,
    /// Request currently holding the unit.
    pub holder: Option<RequestId>,
    /// Allocations served so far.
    pub usage_count: u64,
}

impl ResourceDescriptor {
    /// A free unit with no history.
    pub fn new(id: impl Into<ResourceId>, kind: ResourceKind, capacity: u32) -> Self {
        Self {
            id: id.into(),
            kind,
            capacity,
            available: true,
            holder: None,
            usage_count: 0,
        }
    }
}
