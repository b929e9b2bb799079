//! Priority tier routing and queue/channel naming.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dead-letter list holding ids that exhausted the retry budget.
pub const QUEUE_DEAD_LETTER: &str = "agent_dead_letter";

/// Pub/sub channel carrying task events and status updates.
pub const CHANNEL_TASK_UPDATES: &str = "task_updates";

/// Pub/sub channel carrying worker health samples.
pub const CHANNEL_SYSTEM_HEALTH: &str = "system_health";

/// Priority tier derived from the integer job priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    /// Routing rule: `priority >= 3` is high, `== 2` is medium, anything
    /// else (including out-of-range values) lands in low.
    pub fn for_priority(priority: i32) -> Self {
        if priority >= 3 {
            Tier::High
        } else if priority == 2 {
            Tier::Medium
        } else {
            Tier::Low
        }
    }

    /// The Redis list backing this tier.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Tier::High => "agent_high",
            Tier::Medium => "agent_medium",
            Tier::Low => "agent_low",
        }
    }

    /// Fetch scan order: a non-empty higher tier strictly preempts lower
    /// tiers.
    pub fn scan_order() -> [Tier; 3] {
        [Tier::High, Tier::Medium, Tier::Low]
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.queue_name())
    }
}
