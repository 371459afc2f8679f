//! Exhaustive-partition checks for clustering output
//!
//! A clustering result is accepted only when its problem references cover
//! the request's problems exactly once: nothing omitted, nothing repeated,
//! nothing invented.

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CommonProblemGroup, Document, ProblemRef, WardGroup};

/// Ways a clustering result can fail to partition the problem set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionViolation {
    #[error("unknown problem reference {doc_id}/{problem_id}", doc_id = .0.doc_id, problem_id = .0.problem_id)]
    UnknownRef(ProblemRef),

    #[error("problem {doc_id}/{problem_id} appears more than once", doc_id = .0.doc_id, problem_id = .0.problem_id)]
    DuplicateRef(ProblemRef),

    #[error("{0} problem(s) missing from the grouping")]
    Missing(usize),

    #[error("ward '{0}' does not occur in the documents")]
    UnknownWard(String),

    #[error("ward '{0}' is listed more than once")]
    DuplicateWard(String),

    #[error("problem {doc_id}/{problem_id} is grouped under ward '{ward}' but belongs to another ward", doc_id = .problem.doc_id, problem_id = .problem.problem_id)]
    WrongWard { problem: ProblemRef, ward: String },
}

/// Every problem of a request, with the ward of its document
#[derive(Debug, Clone, Default)]
pub struct ProblemSet {
    refs: HashSet<ProblemRef>,
    ward_of_doc: HashMap<Uuid, String>,
}

impl ProblemSet {
    pub fn from_documents(documents: &[Document]) -> Self {
        let mut set = Self::default();
        for doc in documents {
            set.ward_of_doc.insert(doc.id, doc.ward_label().to_string());
            for problem in &doc.problems {
                set.refs.insert(ProblemRef {
                    doc_id: doc.id,
                    problem_id: problem.id,
                });
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn contains(&self, problem: &ProblemRef) -> bool {
        self.refs.contains(problem)
    }

    /// Ward label of the document owning this reference
    pub fn ward_of(&self, problem: &ProblemRef) -> Option<&str> {
        self.ward_of_doc.get(&problem.doc_id).map(String::as_str)
    }

    /// Ward labels of documents that carry at least one problem
    pub fn wards(&self) -> HashSet<&str> {
        self.refs
            .iter()
            .filter_map(|r| self.ward_of(r))
            .collect()
    }

    /// Check that `refs` is exactly this set, each member once
    pub fn verify_partition<'a, I>(&self, refs: I) -> Result<(), PartitionViolation>
    where
        I: IntoIterator<Item = &'a ProblemRef>,
    {
        let mut seen = HashSet::with_capacity(self.refs.len());
        for problem in refs {
            if !self.contains(problem) {
                return Err(PartitionViolation::UnknownRef(*problem));
            }
            if !seen.insert(*problem) {
                return Err(PartitionViolation::DuplicateRef(*problem));
            }
        }

        let missing = self.refs.len() - seen.len();
        if missing > 0 {
            return Err(PartitionViolation::Missing(missing));
        }
        Ok(())
    }
}

/// Cross-document groups must partition the whole problem set
pub fn verify_common_groups(
    set: &ProblemSet,
    groups: &[CommonProblemGroup],
) -> Result<(), PartitionViolation> {
    set.verify_partition(groups.iter().flat_map(|g| g.problem_ids.iter()))
}

/// Ward groups must name known wards once each, keep every reference inside
/// its own ward, and together partition the whole problem set
pub fn verify_ward_groups(set: &ProblemSet, groups: &[WardGroup]) -> Result<(), PartitionViolation> {
    let known_wards = set.wards();
    let mut listed = HashSet::new();

    for group in groups {
        if !known_wards.contains(group.ward.as_str()) {
            return Err(PartitionViolation::UnknownWard(group.ward.clone()));
        }
        if !listed.insert(group.ward.as_str()) {
            return Err(PartitionViolation::DuplicateWard(group.ward.clone()));
        }

        for problem in group.problems.iter().flat_map(|p| p.problem_ids.iter()) {
            match set.ward_of(problem) {
                None => return Err(PartitionViolation::UnknownRef(*problem)),
                Some(ward) if ward != group.ward => {
                    return Err(PartitionViolation::WrongWard {
                        problem: *problem,
                        ward: group.ward.clone(),
                    })
                }
                Some(_) => {}
            }
        }
    }

    set.verify_partition(
        groups
            .iter()
            .flat_map(|g| g.problems.iter())
            .flat_map(|p| p.problem_ids.iter()),
    )
}
