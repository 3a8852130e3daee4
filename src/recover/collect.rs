/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::collections::BTreeMap;

use crate::{ArcOutput, DkimOutput, Dsp, SignedEvidence};

/// Groups evidence by domain and selector.
#[derive(Debug, Clone, Default)]
pub struct EvidenceCollector {
    groups: BTreeMap<Dsp, Vec<SignedEvidence>>,
    domain: Option<String>,
    every: usize,
}

/// One unit of solver work: the pairs to attempt for a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub index: usize,
    pub dsp: Dsp,
    pub pairs: Vec<(SignedEvidence, SignedEvidence)>,
}

impl EvidenceCollector {
    pub fn new() -> Self {
        EvidenceCollector {
            every: 1,
            ..Default::default()
        }
    }

    /// Only keep groups signed by `domain`.
    pub fn with_domain(mut self, domain: impl AsRef<str>) -> Self {
        self.domain = Some(domain.as_ref().to_ascii_lowercase());
        self
    }

    /// Only keep every `nth` eligible group.
    pub fn with_every(mut self, nth: usize) -> Self {
        self.every = nth.max(1);
        self
    }

    pub fn add(&mut self, dsp: Dsp, evidence: SignedEvidence) {
        self.groups.entry(dsp).or_default().push(evidence);
    }

    /// Adds the evidence of a DKIM verification, returns `false` when the
    /// output carried none.
    pub fn add_dkim(&mut self, output: &DkimOutput, source: &str) -> bool {
        if let Some((dsp, evidence)) = output.evidence(source) {
            self.add(dsp, evidence);
            true
        } else {
            false
        }
    }

    /// Adds every ARC signature and seal hashed during chain verification.
    pub fn add_arc(&mut self, output: &ArcOutput<'_>, source: &str) -> usize {
        let evidence = output.evidence(source);
        let count = evidence.len();
        self.extend(evidence);
        count
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, dsp: &Dsp) -> Option<&[SignedEvidence]> {
        self.groups.get(dsp).map(|group| group.as_slice())
    }

    /// Groups with at least two records that pass the filters, in key order.
    pub fn groups(&self) -> impl Iterator<Item = (&Dsp, &[SignedEvidence])> + '_ {
        self.groups
            .iter()
            .filter(|(dsp, group)| {
                group.len() >= 2
                    && self
                        .domain
                        .as_ref()
                        .map_or(true, |domain| &dsp.domain == domain)
            })
            .map(|(dsp, group)| (dsp, group.as_slice()))
            .step_by(self.every.max(1))
    }

    /// Numbers the eligible groups and splits each into at most two pairs.
    pub fn work_items(&self) -> Vec<WorkItem> {
        self.groups()
            .enumerate()
            .map(|(index, (dsp, group))| WorkItem {
                index,
                dsp: dsp.clone(),
                pairs: pairs(group),
            })
            .collect()
    }
}

impl Extend<(Dsp, SignedEvidence)> for EvidenceCollector {
    fn extend<T: IntoIterator<Item = (Dsp, SignedEvidence)>>(&mut self, iter: T) {
        for (dsp, evidence) in iter {
            self.add(dsp, evidence);
        }
    }
}

impl FromIterator<(Dsp, SignedEvidence)> for EvidenceCollector {
    fn from_iter<T: IntoIterator<Item = (Dsp, SignedEvidence)>>(iter: T) -> Self {
        let mut collector = EvidenceCollector::new();
        collector.extend(iter);
        collector
    }
}

fn pairs(group: &[SignedEvidence]) -> Vec<(SignedEvidence, SignedEvidence)> {
    let indexes: &[(usize, usize)] = match group.len() {
        0 | 1 => &[],
        2 => &[(0, 1)],
        3 => &[(0, 1), (1, 2)],
        _ => &[(0, 1), (2, 3)],
    };
    indexes
        .iter()
        .map(|&(a, b)| (group[a].clone(), group[b].clone()))
        .collect()
}
