//! Deterministic per-ward tally
//!
//! Exact counts computed locally. Wards and categories are listed in order of
//! first appearance, so the same documents always give the same report.

use std::collections::HashMap;

use crate::models::{CategoryCount, Document, WardTally};

pub fn tally_wards(documents: &[Document]) -> Vec<WardTally> {
    let mut tallies: Vec<WardTally> = Vec::new();
    let mut ward_index: HashMap<String, usize> = HashMap::new();

    for doc in documents {
        let ward = doc.ward_label();
        let slot = *ward_index.entry(ward.to_string()).or_insert_with(|| {
            tallies.push(WardTally {
                ward: ward.to_string(),
                total_problems: 0,
                category: Vec::new(),
            });
            tallies.len() - 1
        });
        let tally = &mut tallies[slot];

        tally.total_problems += doc.problems.len();

        for issue in doc
            .problems
            .iter()
            .flat_map(|p| p.category.iter())
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
        {
            match tally.category.iter_mut().find(|c| c.issue == issue) {
                Some(count) => count.problem_count += 1,
                None => tally.category.push(CategoryCount {
                    issue: issue.to_string(),
                    problem_count: 1,
                }),
            }
        }
    }

    tallies
}
