//! ---
//! mtwin_section: "04-hil-bridge"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Binding cache and communication bridge contract."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use m_twin_model::PortValue;

/// Non-blocking view of a cached tag value.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheReading {
    /// Most recent value observed for the tag, or `None` before the first
    /// write ("no data yet").
    pub value: Option<PortValue>,
    /// Age of the value at read time.
    pub age: Option<Duration>,
    /// Set when there is no value, or the value is older than the
    /// configured staleness threshold.
    pub stale: bool,
}

impl CacheReading {
    fn no_data() -> Self {
        Self {
            value: None,
            age: None,
            stale: true,
        }
    }
}

#[derive(Debug, Default)]
struct EntrySlot {
    value: Option<PortValue>,
    updated_at: Option<Instant>,
}

/// Latest-value store decoupling the scheduler from bridge I/O.
///
/// The tag set is frozen at construction; each entry carries its own lock so
/// readers and writers contend on single records only. Writer discipline:
/// the bridge writes read-direction tags, the scheduler writes
/// write-direction tags, and nothing here enforces or needs more than that.
#[derive(Debug)]
pub struct BindingCache {
    staleness_threshold: Duration,
    entries: HashMap<String, Mutex<EntrySlot>>,
}

impl BindingCache {
    pub fn new<I, S>(tags: I, staleness_threshold: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = tags
            .into_iter()
            .map(|tag| (tag.into(), Mutex::new(EntrySlot::default())))
            .collect();
        Self {
            staleness_threshold,
            entries,
        }
    }

    pub fn staleness_threshold(&self) -> Duration {
        self.staleness_threshold
    }

    /// Record a new value for `tag`. Returns `false` when the tag is not
    /// part of the frozen set.
    pub fn write(&self, tag: &str, value: PortValue) -> bool {
        let Some(slot) = self.entries.get(tag) else {
            return false;
        };
        let mut slot = slot.lock();
        slot.value = Some(value);
        slot.updated_at = Some(Instant::now());
        true
    }

    /// Read the latest value for `tag`. Never blocks beyond the single
    /// record lock and never waits for fresh data.
    pub fn read(&self, tag: &str) -> CacheReading {
        let Some(slot) = self.entries.get(tag) else {
            return CacheReading::no_data();
        };
        let slot = slot.lock();
        match (&slot.value, slot.updated_at) {
            (Some(value), Some(updated_at)) => {
                let age = updated_at.elapsed();
                CacheReading {
                    value: Some(value.clone()),
                    age: Some(age),
                    stale: age > self.staleness_threshold,
                }
            }
            _ => CacheReading::no_data(),
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_tags_read_as_no_data() {
        let cache = BindingCache::new(["tag.a"], Duration::from_millis(100));
        let reading = cache.read("tag.a");
        assert!(reading.stale);
        assert!(reading.value.is_none());
    }

    #[test]
    fn fresh_values_are_not_stale() {
        let cache = BindingCache::new(["tag.a"], Duration::from_secs(5));
        assert!(cache.write("tag.a", PortValue::Float(1.5)));
        let reading = cache.read("tag.a");
        assert_eq!(reading.value, Some(PortValue::Float(1.5)));
        assert!(!reading.stale);
    }

    #[test]
    fn values_go_stale_but_remain_readable() {
        let cache = BindingCache::new(["tag.a"], Duration::from_millis(10));
        cache.write("tag.a", PortValue::Integer(7));
        std::thread::sleep(Duration::from_millis(25));
        let reading = cache.read("tag.a");
        // the last known value is still served; only the flag changes
        assert_eq!(reading.value, Some(PortValue::Integer(7)));
        assert!(reading.stale);
    }

    #[test]
    fn unknown_tags_are_rejected_on_write() {
        let cache = BindingCache::new(["tag.a"], Duration::from_secs(1));
        assert!(!cache.write("tag.unknown", PortValue::Bool(true)));
        assert!(cache.read("tag.unknown").value.is_none());
    }
}
