use std::collections::{HashMap, HashSet};

use serde::{Serialize, Serializer};

use super::provider::ProcSample;

/// One node of the reconstructed process forest. Field names on the wire
/// follow the published response schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRecord {
    #[serde(rename = "ProcessName")]
    pub name: String,
    #[serde(rename = "Pid")]
    pub pid: u32,
    /// 0 when the provider reported no live parent.
    #[serde(rename = "Ppid")]
    pub ppid: u32,
    #[serde(rename = "MemoryPercent")]
    pub memory_percent: f32,
    #[serde(rename = "CpuPercent")]
    pub cpu_percent: f32,
    /// Depth at which the traversal reached this record. Bookkeeping only.
    #[serde(skip)]
    pub depth: usize,
    #[serde(rename = "ChildProcess", serialize_with = "null_when_empty")]
    pub children: Vec<ProcessRecord>,
}

/// Leaves serialize their `ChildProcess` field as JSON null, not `[]`.
fn null_when_empty<S: Serializer>(
    children: &Vec<ProcessRecord>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    if children.is_empty() {
        serializer.serialize_none()
    } else {
        children.serialize(serializer)
    }
}

impl ProcessRecord {
    fn from_sample(sample: &ProcSample, depth: usize) -> Self {
        Self {
            name: sample.name.clone(),
            pid: sample.pid,
            ppid: sample.ppid.unwrap_or(0),
            memory_percent: sample.memory_percent,
            cpu_percent: sample.cpu_percent,
            depth,
            children: Vec::new(),
        }
    }
}

/// Full pipeline: flatten the provider sample depth-first, drop duplicate
/// pids, relink parents to children, and rank everything by CPU usage.
pub fn build_forest(samples: &[ProcSample]) -> Vec<ProcessRecord> {
    let mut forest = assemble(dedup(flatten(samples)));
    rank(&mut forest);
    forest
}

/// Visit every sample depth-first, starting one traversal per provider
/// entry, and emit a flat record per visit tagged with its depth.
///
/// A process reachable from an ancestor is emitted more than once (as its
/// own top-level entry and as a descendant); `dedup` sorts that out.
pub fn flatten(samples: &[ProcSample]) -> Vec<ProcessRecord> {
    // First occurrence wins if the provider ever repeats a pid.
    let mut index: HashMap<u32, usize> = HashMap::new();
    for (i, sample) in samples.iter().enumerate() {
        index.entry(sample.pid).or_insert(i);
    }

    // Child slots per sample, derived by ppid/pid matching. Self-parents
    // are left unlinked so the visit below cannot recurse forever.
    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); samples.len()];
    for (i, sample) in samples.iter().enumerate() {
        if let Some(ppid) = sample.ppid {
            if let Some(&parent) = index.get(&ppid) {
                if parent != i {
                    children_of[parent].push(i);
                }
            }
        }
    }

    fn visit(
        i: usize,
        depth: usize,
        samples: &[ProcSample],
        children_of: &[Vec<usize>],
        out: &mut Vec<ProcessRecord>,
    ) {
        out.push(ProcessRecord::from_sample(&samples[i], depth));
        for &child in &children_of[i] {
            visit(child, depth + 1, samples, children_of, out);
        }
    }

    let mut records = Vec::new();
    for i in 0..samples.len() {
        visit(i, 0, samples, &children_of, &mut records);
    }
    records
}

/// Keep the first record per pid, preserving input order.
pub fn dedup(records: Vec<ProcessRecord>) -> Vec<ProcessRecord> {
    let mut seen: HashSet<u32> = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.pid))
        .collect()
}

/// Link each record under the record whose pid matches its ppid and return
/// the roots: records with no live parent in the set. A record whose ppid
/// equals its own pid surfaces as a root.
///
/// Expects deduplicated input; pid is the lookup key.
pub fn assemble(records: Vec<ProcessRecord>) -> Vec<ProcessRecord> {
    let index: HashMap<u32, usize> = records
        .iter()
        .enumerate()
        .map(|(i, record)| (record.pid, i))
        .collect();

    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut attached = vec![false; records.len()];
    for (i, record) in records.iter().enumerate() {
        if let Some(&parent) = index.get(&record.ppid) {
            if parent != i {
                children_of[parent].push(i);
                attached[i] = true;
            }
        }
    }

    fn take(
        i: usize,
        slots: &mut [Option<ProcessRecord>],
        children_of: &[Vec<usize>],
    ) -> Option<ProcessRecord> {
        let mut record = slots[i].take()?;
        record.children = children_of[i]
            .iter()
            .filter_map(|&child| take(child, slots, children_of))
            .collect();
        Some(record)
    }

    let mut slots: Vec<Option<ProcessRecord>> = records.into_iter().map(Some).collect();
    (0..slots.len())
        .filter(|&i| !attached[i])
        .filter_map(|i| take(i, &mut slots, &children_of))
        .collect()
}

/// Stable sort by CPU usage descending, recursively through every
/// children list. Ties keep their discovery order.
pub fn rank(forest: &mut [ProcessRecord]) {
    forest.sort_by(|a, b| {
        b.cpu_percent
            .partial_cmp(&a.cpu_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for record in forest.iter_mut() {
        rank(&mut record.children);
    }
}
