use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// The entity kind used for likes when a caller only gives us an id.
pub const DEFAULT_ENTITY_KIND: &str = "post";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseEventKeyError {
    #[error("event key '{0}' is not of the form <entity-kind>:<id>")]
    MissingSeparator(String),
    #[error("event key '{0}' has an empty entity kind or id")]
    EmptyComponent(String),
    #[error("no event keys were provided")]
    NoKeys,
}

/// One like for one entity, identified as `<entity-kind>:<id>`.
///
/// Keys travel through the queue as plain strings, so the only structure we
/// enforce is the separator between the kind and the id. The id itself may
/// contain further colons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventKey(String);

impl EventKey {
    pub fn new(entity_kind: &str, id: &str) -> Result<Self, ParseEventKeyError> {
        format!("{}:{}", entity_kind, id).parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn entity_kind(&self) -> &str {
        self.0
            .split_once(':')
            .map(|(kind, _)| kind)
            .unwrap_or_default()
    }
}

impl FromStr for EventKey {
    type Err = ParseEventKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None => Err(ParseEventKeyError::MissingSeparator(s.to_owned())),
            Some((kind, id)) if kind.is_empty() || id.is_empty() => {
                Err(ParseEventKeyError::EmptyComponent(s.to_owned()))
            }
            Some(_) => Ok(EventKey(s.to_owned())),
        }
    }
}

impl TryFrom<String> for EventKey {
    type Error = ParseEventKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventKey> for String {
    fn from(key: EventKey) -> Self {
        key.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed set of entities the producer picks from when a like does not name its target.
/// Parsed from a comma separated list, e.g. `post:1,post:2,post:3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet(Vec<EventKey>);

impl TargetSet {
    pub fn new(keys: Vec<EventKey>) -> Result<Self, ParseEventKeyError> {
        if keys.is_empty() {
            return Err(ParseEventKeyError::NoKeys);
        }
        Ok(TargetSet(keys))
    }

    /// Pick one target uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &EventKey {
        self.0
            .choose(rng)
            .expect("TargetSet is never empty, see TargetSet::new")
    }

    pub fn keys(&self) -> &[EventKey] {
        &self.0
    }
}

impl FromStr for TargetSet {
    type Err = ParseEventKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let keys = s
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(EventKey::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        TargetSet::new(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn parse_event_key() {
        let key: EventKey = "post:1".parse().unwrap();
        assert_eq!(key.as_str(), "post:1");
        assert_eq!(key.entity_kind(), "post");

        let key: EventKey = "post:a:b".parse().unwrap();
        assert_eq!(key.entity_kind(), "post");

        assert_eq!(
            "post1".parse::<EventKey>(),
            Err(ParseEventKeyError::MissingSeparator("post1".to_owned()))
        );
        assert_eq!(
            ":1".parse::<EventKey>(),
            Err(ParseEventKeyError::EmptyComponent(":1".to_owned()))
        );
        assert_eq!(
            "post:".parse::<EventKey>(),
            Err(ParseEventKeyError::EmptyComponent("post:".to_owned()))
        );
    }

    #[test]
    fn event_key_from_parts() {
        let key = EventKey::new(DEFAULT_ENTITY_KIND, "42").unwrap();
        assert_eq!(key.to_string(), "post:42");
        assert!(EventKey::new(DEFAULT_ENTITY_KIND, "").is_err());
    }

    #[test]
    fn event_key_serializes_as_plain_string() {
        let key: EventKey = "post:7".parse().unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"post:7\"");

        let back: EventKey = serde_json::from_str("\"post:7\"").unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<EventKey>("\"nope\"").is_err());
    }

    #[test]
    fn parse_target_set() {
        let targets: TargetSet = "post:1, post:2,post:3,".parse().unwrap();
        let keys: Vec<&str> = targets.keys().iter().map(EventKey::as_str).collect();
        assert_eq!(keys, vec!["post:1", "post:2", "post:3"]);

        assert_eq!("".parse::<TargetSet>(), Err(ParseEventKeyError::NoKeys));
        assert!("post:1,bad".parse::<TargetSet>().is_err());
    }

    #[test]
    fn single_target_is_always_chosen() {
        let targets: TargetSet = "post:9".parse().unwrap();
        let mut rng = StepRng::new(u64::MAX, 7);

        for _ in 0..5 {
            assert_eq!(targets.choose(&mut rng).as_str(), "post:9");
        }
    }

    #[test]
    fn choose_stays_within_the_set() {
        let targets: TargetSet = "post:1,post:2".parse().unwrap();
        let mut rng = StepRng::new(0, 1 << 60);

        for _ in 0..20 {
            let chosen = targets.choose(&mut rng);
            assert!(targets.keys().contains(chosen));
        }
    }
}
