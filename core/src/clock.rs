//! Hybrid logical clock for causal ordering of messages.
//!
//! The clock combines wall-clock milliseconds with a logical counter and a
//! node identifier, which gives a total order across all replicas that is
//! consistent with causality even when wall clocks disagree.

use crate::error::Error;
use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Packed width of the physical component (decimal digits).
const PHYSICAL_WIDTH: usize = 15;
/// Packed width of the logical component (base-36 digits).
const LOGICAL_WIDTH: usize = 5;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A hybrid logical clock value.
///
/// Ordering rules:
/// 1. Higher physical time wins
/// 2. If physical times are equal, higher logical counter wins
/// 3. If both are equal, lexicographically higher node wins
///
/// This ensures a total order across all messages from all nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hlc {
    /// Wall-clock milliseconds since the Unix epoch
    pub physical: u64,
    /// Tie-break counter within a physical tick
    pub logical: u32,
    /// Client identifier; opaque, final tie-break
    pub node: NodeId,
}

impl Hlc {
    /// Create a clock value from its parts.
    pub fn new(physical: u64, logical: u32, node: impl Into<NodeId>) -> Self {
        Self {
            physical,
            logical,
            node: node.into(),
        }
    }

    /// Create a clock value at the current wall time, counter zero.
    pub fn now(node: impl Into<NodeId>) -> Self {
        Self::new(wall_clock_ms(), 0, node)
    }

    /// Pack into the canonical string form.
    ///
    /// Physical is decimal left-padded to 15 digits, logical is base-36
    /// left-padded to 5 digits, fields are joined with `:`, and the node is
    /// appended verbatim (it may itself contain `:`). The packed form is
    /// lexicographically order-preserving for the `(physical, logical)`
    /// prefix.
    pub fn pack(&self) -> String {
        format!(
            "{:0physical$}:{:0>logical$}:{}",
            self.physical,
            to_base36(self.logical),
            self.node,
            physical = PHYSICAL_WIDTH,
            logical = LOGICAL_WIDTH,
        )
    }

    /// Parse a packed clock value.
    ///
    /// Returns `None` for the empty string or any string whose first two
    /// `:`-separated fields are not parseable integers. Everything after
    /// the second delimiter is the node, including further `:` characters.
    pub fn parse(packed: &str) -> Option<Hlc> {
        let mut parts = packed.splitn(3, ':');
        let physical = parts.next()?.parse::<u64>().ok()?;
        let logical = u32::from_str_radix(parts.next()?, 36).ok()?;
        let node = parts.next().unwrap_or("").to_string();
        Some(Hlc {
            physical,
            logical,
            node,
        })
    }
}

impl fmt::Display for Hlc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pack())
    }
}

impl Ord for Hlc {
    fn cmp(&self, other: &Self) -> Ordering {
        self.physical
            .cmp(&other.physical)
            .then_with(|| self.logical.cmp(&other.logical))
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for Hlc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two packed clock strings.
///
/// Both invalid compares equal; exactly one invalid compares strictly less
/// than the valid one; otherwise the parsed total order applies. Malformed
/// input is a value, never a panic.
pub fn compare_packed(a: &str, b: &str) -> Ordering {
    match (Hlc::parse(a), Hlc::parse(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(&b),
    }
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize] as char);
        value /= 36;
    }
    out.iter().rev().collect()
}

/// The clock engine: the single point where time enters the system.
///
/// One engine exists per replicator. `send` stamps outgoing messages,
/// `receive` folds in remote timestamps so that subsequent local sends are
/// causally after everything observed.
#[derive(Debug, Clone)]
pub struct HlcClock {
    current: Hlc,
}

impl HlcClock {
    /// Create an engine for a node, seeded at the current wall time.
    pub fn new(node: impl Into<NodeId>) -> Self {
        Self {
            current: Hlc::now(node),
        }
    }

    /// The most recently produced clock value.
    pub fn current(&self) -> &Hlc {
        &self.current
    }

    /// Produce the next local timestamp.
    ///
    /// Strictly greater than every value this engine has produced or
    /// received, regardless of wall-clock regressions.
    pub fn send(&mut self) -> Hlc {
        self.send_at(wall_clock_ms())
    }

    /// `send` with an explicit wall-clock reading.
    pub fn send_at(&mut self, now: u64) -> Hlc {
        let physical = now.max(self.current.physical);
        let logical = if now > self.current.physical {
            0
        } else {
            self.current.logical.saturating_add(1)
        };
        self.current = Hlc::new(physical, logical, self.current.node.clone());
        self.current.clone()
    }

    /// Fold a remote timestamp into the engine.
    ///
    /// After this returns, the next `send` is strictly greater than both
    /// the prior local state and `remote`. If `max_drift` is set and the
    /// remote physical time is more than that far ahead of the wall clock,
    /// the call fails with [`Error::TimeDrift`] and the state is unchanged.
    pub fn receive(&mut self, remote: &Hlc, max_drift: Option<Duration>) -> Result<Hlc, Error> {
        self.receive_at(remote, wall_clock_ms(), max_drift)
    }

    /// `receive` with an explicit wall-clock reading.
    pub fn receive_at(
        &mut self,
        remote: &Hlc,
        now: u64,
        max_drift: Option<Duration>,
    ) -> Result<Hlc, Error> {
        if let Some(max_drift) = max_drift {
            let bound = max_drift.as_millis() as u64;
            if remote.physical > now && remote.physical - now > bound {
                return Err(Error::TimeDrift {
                    drift: remote.physical - now,
                    max_drift: bound,
                });
            }
        }

        let node = self.current.node.clone();
        let next = if now > self.current.physical && now > remote.physical {
            Hlc::new(now, 0, node)
        } else if self.current.physical < remote.physical {
            Hlc::new(remote.physical, remote.logical.saturating_add(1), node)
        } else if self.current.physical > remote.physical {
            Hlc::new(
                self.current.physical,
                self.current.logical.saturating_add(1),
                node,
            )
        } else {
            Hlc::new(
                self.current.physical,
                self.current.logical.max(remote.logical).saturating_add(1),
                node,
            )
        };

        self.current = next.clone();
        Ok(next)
    }
}
