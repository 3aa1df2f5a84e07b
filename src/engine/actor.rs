// Actor records as the engine sees them: classification, action values, status tags.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::config::*;

/// Character type as written in the `"Type"` action value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Pc,
    Ally,
    Mook,
    FeaturedFoe,
    Boss,
    UberBoss,
    Vehicle,
    Unclassified,
}

impl Classification {
    pub fn from_type_name(name: &str) -> Self {
        match name.trim() {
            "PC" => Classification::Pc,
            "Ally" => Classification::Ally,
            "Mook" => Classification::Mook,
            "Featured Foe" => Classification::FeaturedFoe,
            "Boss" => Classification::Boss,
            "Uber-Boss" => Classification::UberBoss,
            _ => Classification::Unclassified,
        }
    }
}

/// A single action value. Anything that is neither an integer nor a string is
/// kept verbatim so content the engine does not understand survives a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionValue {
    Number(i32),
    Text(String),
    Other(serde_json::Value),
}

impl ActionValue {
    /// Numeric reading of the value. Text such as `"+3"` or `"-2"` counts, and
    /// so does a whole-valued float like `30.0`.
    pub fn as_number(&self) -> Option<i32> {
        match self {
            ActionValue::Number(n) => Some(*n),
            ActionValue::Text(s) => {
                let s = s.trim();
                s.strip_prefix('+').unwrap_or(s).parse().ok()
            }
            ActionValue::Other(serde_json::Value::Number(n)) => {
                let whole = n.as_f64().filter(|f| f.fract() == 0.0)?;
                i32::try_from(whole as i64).ok()
            }
            ActionValue::Other(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ActionValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for ActionValue {
    fn from(n: i32) -> Self {
        ActionValue::Number(n)
    }
}

impl From<&str> for ActionValue {
    fn from(s: &str) -> Self {
        ActionValue::Text(s.to_string())
    }
}

impl From<String> for ActionValue {
    fn from(s: String) -> Self {
        ActionValue::Text(s)
    }
}

/// String-keyed action value map with accessors for the keys the engine reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionValues(BTreeMap<String, ActionValue>);

impl ActionValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ActionValue> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<i32> {
        self.0.get(key).and_then(ActionValue::as_number)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(ActionValue::as_text)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ActionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn set_number(&mut self, key: &str, value: i32) {
        self.0.insert(key.to_string(), ActionValue::Number(value));
    }

    /// Put `key` back to its value in `original`, or drop it if `original` has none.
    pub fn restore(&mut self, key: &str, original: &ActionValues) {
        match original.get(key) {
            Some(value) => {
                self.0.insert(key.to_string(), value.clone());
            }
            None => {
                self.0.remove(key);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ActionValue)> {
        self.0.iter()
    }

    /// Last-write-wins merge of `other` onto `self`.
    pub fn merge(&mut self, other: &ActionValues) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    // ── Known keys ────────────────────────────────────────────────────

    pub fn classification(&self) -> Classification {
        self.text(AV_TYPE)
            .map(Classification::from_type_name)
            .unwrap_or(Classification::Unclassified)
    }

    pub fn wounds(&self) -> i32 {
        self.number(AV_WOUNDS).unwrap_or(0)
    }

    pub fn set_wounds(&mut self, wounds: i32) {
        self.set_number(AV_WOUNDS, wounds);
    }

    pub fn fortune(&self) -> i32 {
        self.number(AV_FORTUNE).unwrap_or(0)
    }

    pub fn set_fortune(&mut self, fortune: i32) {
        self.set_number(AV_FORTUNE, fortune);
    }

    /// Name of the skill the actor attacks with.
    pub fn main_attack(&self) -> &str {
        self.text(AV_MAIN_ATTACK).unwrap_or(DEFAULT_MAIN_ATTACK)
    }

    pub fn chase_points(&self) -> i32 {
        self.number(AV_CHASE_POINTS).unwrap_or(0)
    }

    pub fn condition_points(&self) -> i32 {
        self.number(AV_CONDITION_POINTS).unwrap_or(0)
    }
}

impl<K, V> FromIterator<(K, V)> for ActionValues
where
    K: Into<String>,
    V: Into<ActionValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ActionValues(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Ordered, duplicate-free list of status tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct StatusList(Vec<String>);

impl From<Vec<String>> for StatusList {
    fn from(tags: Vec<String>) -> Self {
        let mut list = StatusList::default();
        for tag in tags {
            list.add(tag);
        }
        list
    }
}

impl From<StatusList> for Vec<String> {
    fn from(list: StatusList) -> Self {
        list.0
    }
}

impl StatusList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag unless it is already present. Returns whether the list changed.
    pub fn add(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.contains(&tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    /// Returns whether the tag was present.
    pub fn remove(&mut self, tag: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|t| t != tag);
        self.0.len() != before
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn recovery_state(&self) -> RecoveryState {
        if self.contains(STATUS_UP_CHECK_REQUIRED) {
            RecoveryState::UpCheckRequired
        } else if self.contains(STATUS_OUT_OF_FIGHT) {
            RecoveryState::OutOfFight
        } else {
            RecoveryState::Active
        }
    }
}

/// Recovery state derived from status tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    Active,
    UpCheckRequired,
    OutOfFight,
}

/// Which record an actor lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ActorRef {
    Character(i64),
    Vehicle(i64),
}

impl ActorRef {
    pub fn id(self) -> i64 {
        match self {
            ActorRef::Character(id) | ActorRef::Vehicle(id) => id,
        }
    }

    pub fn entity(self) -> &'static str {
        match self {
            ActorRef::Character(_) => "character",
            ActorRef::Vehicle(_) => "vehicle",
        }
    }
}

/// A character or vehicle. The engine never creates or deletes these; it
/// reads them and writes back `Wounds`, `status` and `impairments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Actor {
    pub reference: ActorRef,
    pub name: String,
    pub action_values: ActionValues,
    pub status: StatusList,
    pub impairments: i32,
    pub updated_at: String,
}

impl Actor {
    pub fn classification(&self) -> Classification {
        match self.reference {
            ActorRef::Vehicle(_) => Classification::Vehicle,
            ActorRef::Character(_) => self.action_values.classification(),
        }
    }

    pub fn is_pc(&self) -> bool {
        self.classification() == Classification::Pc
    }
}
