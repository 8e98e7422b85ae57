//! Batch processing with conflict-based partitioning
//!
//! This module provides `BatchProcessor`, which runs a batch of replay
//! commands concurrently while keeping every pair of conflicting commands in
//! file order.
//!
//! # Design
//!
//! Two commands conflict when they share a key from
//! [`EscrowEngine::conflict_keys`]: a user, an offer reference or a trade
//! reference. Conflicts are transitive (a trade links its buyer to the offer,
//! the offer links to its owner), so the batch is split into the connected
//! components of the conflict graph with a union-find. Each component runs
//! sequentially in its own tokio task; components run in parallel.
//!
//! Commands in different components touch disjoint balance rows, offers and
//! trades, so the final state does not depend on how tasks interleave.

use std::collections::HashMap;
use std::sync::Arc;

use super::engine::EscrowEngine;
use super::traits::LedgerStore;
use crate::types::{Command, LedgerError};

/// Result of processing a single command
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub command: Command,
    pub result: Result<(), LedgerError>,
}

/// Batch processor with conflict-based partitioning
pub struct BatchProcessor<S: LedgerStore + 'static> {
    engine: Arc<EscrowEngine<S>>,
}

impl<S: LedgerStore + 'static> Clone for BatchProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S: LedgerStore + 'static> BatchProcessor<S> {
    pub fn new(engine: Arc<EscrowEngine<S>>) -> Self {
        Self { engine }
    }

    /// Split a batch into independent groups
    ///
    /// # Guarantees
    ///
    /// - Each command appears in exactly one group
    /// - Commands sharing a conflict key land in the same group
    /// - Within a group, commands keep their original order
    /// - Groups are ordered by their first command
    pub fn partition(&self, batch: Vec<Command>) -> Vec<Vec<Command>> {
        let mut parent: Vec<usize> = (0..batch.len()).collect();
        let mut first_seen: HashMap<String, usize> = HashMap::new();

        for (index, command) in batch.iter().enumerate() {
            for key in self.engine.conflict_keys(command) {
                match first_seen.get(&key) {
                    Some(&other) => union(&mut parent, index, other),
                    None => {
                        first_seen.insert(key, index);
                    }
                }
            }
        }

        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<Command>> = Vec::new();
        for (index, command) in batch.into_iter().enumerate() {
            let root = find(&mut parent, index);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(command);
        }
        groups
    }

    /// Process one group sequentially, capturing every outcome
    pub async fn process_group(&self, commands: Vec<Command>) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let result = self.engine.process(command.clone());
            results.push(ProcessingResult { command, result });
        }
        results
    }

    /// Partition a batch and process the groups concurrently
    ///
    /// Results from different groups may arrive in any order.
    pub async fn process_batch(&self, batch: Vec<Command>) -> Vec<ProcessingResult> {
        let groups = self.partition(batch);
        tracing::debug!(groups = groups.len(), "processing batch");

        let mut tasks = Vec::with_capacity(groups.len());
        for group in groups {
            let processor = self.clone();
            tasks.push(tokio::spawn(async move { processor.process_group(group).await }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(group_results) => results.extend(group_results),
                Err(e) => tracing::error!(error = %e, "batch task panicked"),
            }
        }
        results
    }
}

fn find(parent: &mut [usize], mut node: usize) -> usize {
    while parent[node] != node {
        parent[node] = parent[parent[node]];
        node = parent[node];
    }
    node
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}
