//! The agent relationship graph.
//!
//! Vouches, squad membership, and collaboration history are modeled as an
//! arena: a node vector with integer indices and a single edge list sorted
//! by `(source, type, target)`. This gives deterministic iteration, cheap
//! replay, and cycle-safe traversal via a visited bitset.
//!
//! The graph is derived state, rebuilt from signals at query time; it is
//! never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::signal::{Signal, SignalType};

/// Edge types in the trust network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeType {
    /// Explicit trust: source vouches for target.
    Vouch,
    /// Source belongs to squad target.
    MemberOf,
    /// Source and target contributed to the same verified outcome.
    Collaborate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Edge {
    source: u32,
    ty: EdgeType,
    target: u32,
}

/// Internal/external collaboration counts for the isolation index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IsolationProfile {
    /// Collaborations with vouch-connected counterparts.
    pub internal_collabs: u32,
    /// Collaborations with everyone else.
    pub external_collabs: u32,
}

impl IsolationProfile {
    /// The isolation index
    /// `I = internal / (internal + external + 1)`.
    #[must_use]
    pub fn index(&self) -> f64 {
        f64::from(self.internal_collabs)
            / f64::from(self.internal_collabs + self.external_collabs + 1)
    }
}

/// Visited bitset over node indices.
struct Visited {
    words: Vec<u64>,
}

impl Visited {
    fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
        }
    }

    fn insert(&mut self, index: u32) -> bool {
        let (word, bit) = (index as usize / 64, index as usize % 64);
        let fresh = self.words[word] & (1 << bit) == 0;
        self.words[word] |= 1 << bit;
        fresh
    }
}

/// Arena graph of agents and their relationships.
#[derive(Debug, Default)]
pub struct AgentGraph {
    ids: Vec<String>,
    index: BTreeMap<String, u32>,
    edges: Vec<Edge>,
}

impl AgentGraph {
    /// Builds the graph from signals up to `as_of`.
    ///
    /// `VOUCH` and `MEMBER_OF` signals become explicit edges; contributors
    /// named in the same `TRUTH_VERIFIED` become pairwise `Collaborate`
    /// edges.
    #[must_use]
    pub fn from_signals(signals: &[Signal], as_of: DateTime<Utc>) -> Self {
        let mut graph = Self::default();
        let mut window: Vec<&Signal> = signals.iter().filter(|s| s.time <= as_of).collect();
        window.sort_by(|a, b| (a.time, &a.signal_id).cmp(&(b.time, &b.signal_id)));

        for signal in window {
            match signal.signal_type {
                SignalType::Vouch => {
                    let source = graph.intern(&signal.agent_id);
                    let target = graph.intern(&signal.object_id);
                    graph.edges.push(Edge { source, ty: EdgeType::Vouch, target });
                },
                SignalType::MemberOf => {
                    let source = graph.intern(&signal.agent_id);
                    let target = graph.intern(&signal.object_id);
                    graph.edges.push(Edge { source, ty: EdgeType::MemberOf, target });
                },
                SignalType::TruthVerified => {
                    let contributors: Vec<u32> = signal
                        .payload
                        .get("contributors")
                        .and_then(Value::as_array)
                        .map(|arr| {
                            arr.iter()
                                .filter_map(Value::as_str)
                                .map(|id| graph.intern(id))
                                .collect()
                        })
                        .unwrap_or_default();
                    for i in 0..contributors.len() {
                        for j in (i + 1)..contributors.len() {
                            graph.edges.push(Edge {
                                source: contributors[i],
                                ty: EdgeType::Collaborate,
                                target: contributors[j],
                            });
                        }
                    }
                },
                _ => {},
            }
        }

        graph.edges.sort();
        graph.edges.dedup();
        graph
    }

    fn intern(&mut self, id: &str) -> u32 {
        if let Some(&index) = self.index.get(id) {
            return index;
        }
        let index = self.ids.len() as u32;
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), index);
        index
    }

    /// Number of known agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the graph holds no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn node(&self, id: &str) -> Option<u32> {
        self.index.get(id).copied()
    }

    /// Accumulated inbound vouch weight for an agent: a breadth-first walk
    /// over reversed vouch edges, at most `max_depth` hops, each hop
    /// losing `hop_decay` of its weight, cycles broken by a visited set.
    ///
    /// Each voucher contributes `standing/1000 × hop_weight`; standings
    /// come from the caller's map (zero for unknown agents).
    #[must_use]
    pub fn inbound_vouch_weight(
        &self,
        agent_id: &str,
        standings: &BTreeMap<String, f64>,
        max_depth: u32,
        hop_decay: f64,
    ) -> f64 {
        let Some(start) = self.node(agent_id) else {
            return 0.0;
        };
        let mut visited = Visited::new(self.ids.len());
        visited.insert(start);

        let mut total = 0.0;
        let mut frontier = vec![start];
        for hop in 1..=max_depth {
            let hop_weight = (1.0 - hop_decay * f64::from(hop)).max(0.0);
            if hop_weight == 0.0 {
                break;
            }
            let mut next = Vec::new();
            for &node in &frontier {
                // Reversed vouch edges: who vouches for `node`.
                for edge in &self.edges {
                    if edge.ty == EdgeType::Vouch
                        && edge.target == node
                        && visited.insert(edge.source)
                    {
                        let voucher = &self.ids[edge.source as usize];
                        let standing = standings.get(voucher).copied().unwrap_or(0.0);
                        total += (standing / 1000.0) * hop_weight;
                        next.push(edge.source);
                    }
                }
            }
            // Deterministic frontier order.
            next.sort_unstable();
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }
        total
    }

    /// Internal/external collaboration counts for an agent.
    ///
    /// A collaboration is internal when the counterpart is connected to the
    /// agent by a vouch edge in either direction.
    #[must_use]
    pub fn isolation_profile(&self, agent_id: &str) -> IsolationProfile {
        let Some(node) = self.node(agent_id) else {
            return IsolationProfile::default();
        };

        let vouch_linked: Vec<u32> = self
            .edges
            .iter()
            .filter(|e| e.ty == EdgeType::Vouch)
            .filter_map(|e| {
                if e.source == node {
                    Some(e.target)
                } else if e.target == node {
                    Some(e.source)
                } else {
                    None
                }
            })
            .collect();

        let mut profile = IsolationProfile::default();
        for edge in &self.edges {
            if edge.ty != EdgeType::Collaborate {
                continue;
            }
            let counterpart = if edge.source == node {
                edge.target
            } else if edge.target == node {
                edge.source
            } else {
                continue;
            };
            if vouch_linked.contains(&counterpart) {
                profile.internal_collabs += 1;
            } else {
                profile.external_collabs += 1;
            }
        }
        profile
    }

    /// Whether the agent has a collaboration edge with any counterpart the
    /// predicate accepts (used for grounding relief against calibrated
    /// sensors and authorities).
    #[must_use]
    pub fn has_grounding_with(&self, agent_id: &str, is_grounded: impl Fn(&str) -> bool) -> bool {
        let Some(node) = self.node(agent_id) else {
            return false;
        };
        self.edges
            .iter()
            .filter(|e| e.ty == EdgeType::Collaborate)
            .any(|e| {
                let counterpart = if e.source == node {
                    Some(e.target)
                } else if e.target == node {
                    Some(e.source)
                } else {
                    None
                };
                counterpart.is_some_and(|c| is_grounded(&self.ids[c as usize]))
            })
    }
}
