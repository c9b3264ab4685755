//! Topology Resolver (§4.C): derives producer→consumer edges from label
//! selectors, and checks feasibility and acyclicity.

use mywant_core::labels::Selector;
use mywant_core::want::Requires;
use mywant_core::{Metadata, ResolutionError, WantId};
use std::collections::{HashMap, HashSet};

/// One resolved producer→consumer edge, carrying the bounded channel
/// capacity its wiring should use (§4.C "Output").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub producer: WantId,
    pub consumer: WantId,
    pub capacity: usize,
}

/// The resolved wiring for a single want: everything it reads from, and
/// everything it feeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wiring {
    pub inputs: Vec<Edge>,
    pub outputs: Vec<Edge>,
}

/// The full resolved topology: one [`Wiring`] per want id.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub wiring: HashMap<WantId, Wiring>,
}

impl Topology {
    #[must_use]
    pub fn wiring_for(&self, id: WantId) -> Wiring {
        self.wiring.get(&id).cloned().unwrap_or_default()
    }
}

/// A want as the resolver sees it: identity, labels, its `using` selectors,
/// its `requires` policy, and whether its type tolerates cyclic wiring
/// (§4.C "loop-safe").
#[derive(Debug, Clone)]
pub struct ResolverInput {
    pub metadata: Metadata,
    pub using: Vec<Selector>,
    pub requires: Requires,
    pub loop_safe: bool,
}

/// Resolve edges for every want in `wants`, given a way to look up the
/// default channel capacity for a producer's want type.
///
/// Returns the resolved topology plus, for any want whose resolution
/// failed, the diagnostic to attach to its status (§4.F step 4: "mark
/// offending wants with a failed status... but continue with the rest").
/// Wants that merely produced a non-fatal warning (zero matches on a
/// selector when `requires` doesn't demand it) are not included in the
/// error list.
pub fn resolve(
    wants: &[ResolverInput],
    capacity_for_type: impl Fn(&str) -> usize,
) -> (Topology, Vec<(WantId, ResolutionError)>) {
    let mut topology = Topology::default();
    let mut errors = Vec::new();

    for want in wants {
        topology.wiring.entry(want.metadata.id).or_default();
    }

    for consumer in wants {
        if consumer.using.is_empty() {
            continue;
        }
        let mut matched_any_selector_with_zero = None;
        for selector in &consumer.using {
            let producers: Vec<&ResolverInput> = wants
                .iter()
                .filter(|p| p.metadata.id != consumer.metadata.id)
                .filter(|p| selector.matches(&p.metadata.labels))
                .collect();

            if producers.is_empty() {
                if matched_any_selector_with_zero.is_none() {
                    matched_any_selector_with_zero = Some(selector.clone());
                }
                continue;
            }

            for producer in producers {
                let capacity = capacity_for_type(&producer.metadata.type_tag);
                let edge = Edge {
                    producer: producer.metadata.id,
                    consumer: consumer.metadata.id,
                    capacity,
                };
                topology
                    .wiring
                    .entry(producer.metadata.id)
                    .or_default()
                    .outputs
                    .push(edge.clone());
                topology
                    .wiring
                    .entry(consumer.metadata.id)
                    .or_default()
                    .inputs
                    .push(edge);
            }
        }

        if let Some(unmatched) = matched_any_selector_with_zero {
            if consumer.requires.needs_providers() {
                errors.push((
                    consumer.metadata.id,
                    ResolutionError::UnsatisfiedProvider(consumer.metadata.id, unmatched.to_string()),
                ));
            }
            // else: a warning only, per §4.C "Multiplicity" — not surfaced as an error.
        }
    }

    for want in wants {
        if want.requires.needs_users() {
            let has_consumer = topology
                .wiring
                .get(&want.metadata.id)
                .is_some_and(|w| !w.outputs.is_empty());
            if !has_consumer {
                errors.push((
                    want.metadata.id,
                    ResolutionError::UnsatisfiedConsumer(want.metadata.id),
                ));
            }
        }
    }

    if let Some(cycle) = detect_cycle(wants, &topology) {
        for id in &cycle {
            errors.push((*id, ResolutionError::Cycle(cycle.clone())));
        }
    }

    (topology, errors)
}

/// Detect a cycle among wants whose type is *not* loop-safe (§4.C "Cycle
/// detection"). Loop-safe wants (e.g. a fibonacci feedback generator) are
/// exempted from participating in a detected cycle: an edge into or out of
/// a loop-safe want is simply not followed when walking for cycles.
fn detect_cycle(wants: &[ResolverInput], topology: &Topology) -> Option<Vec<WantId>> {
    let loop_safe: HashSet<WantId> = wants.iter().filter(|w| w.loop_safe).map(|w| w.metadata.id).collect();

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut marks: HashMap<WantId, Mark> = wants.iter().map(|w| (w.metadata.id, Mark::Unvisited)).collect();
    let mut stack = Vec::new();

    fn visit(
        id: WantId,
        topology: &Topology,
        loop_safe: &HashSet<WantId>,
        marks: &mut HashMap<WantId, Mark>,
        stack: &mut Vec<WantId>,
    ) -> Option<Vec<WantId>> {
        if loop_safe.contains(&id) {
            return None;
        }
        match marks.get(&id) {
            Some(Mark::Done) => return None,
            Some(Mark::InProgress) => {
                let start = stack.iter().position(|x| *x == id).unwrap_or(0);
                return Some(stack[start..].to_vec());
            }
            _ => {}
        }
        marks.insert(id, Mark::InProgress);
        stack.push(id);
        if let Some(wiring) = topology.wiring.get(&id) {
            for edge in &wiring.outputs {
                if loop_safe.contains(&edge.consumer) {
                    continue;
                }
                if let Some(cycle) = visit(edge.consumer, topology, loop_safe, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(id, Mark::Done);
        None
    }

    for want in wants {
        if let Some(cycle) = visit(want.metadata.id, topology, &loop_safe, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use mywant_core::labels::Labels;

    fn input(id: u64, labels: &[(&str, &str)], using: Vec<Selector>, requires: Requires) -> ResolverInput {
        ResolverInput {
            metadata: Metadata {
                id: WantId::from_raw(id),
                name: format!("w{id}"),
                type_tag: "t".into(),
                labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<Labels>(),
                owner_references: vec![],
            },
            using,
            requires,
            loop_safe: false,
        }
    }

    #[test]
    fn fan_in_wires_every_matching_producer() {
        let p1 = input(1, &[("role", "src")], vec![], Requires::None);
        let p2 = input(2, &[("role", "src")], vec![], Requires::None);
        let c = input(3, &[], vec![Selector::new([("role", "src")])], Requires::Providers);
        let (topo, errors) = resolve(&[p1, p2, c], |_| 16);
        assert!(errors.is_empty());
        assert_eq!(topo.wiring_for(WantId::from_raw(3)).inputs.len(), 2);
        assert_eq!(topo.wiring_for(WantId::from_raw(1)).outputs.len(), 1);
    }

    #[test]
    fn unsatisfied_provider_is_hard_error_only_when_required() {
        let c_required = input(
            1,
            &[],
            vec![Selector::new([("role", "src")])],
            Requires::Providers,
        );
        let (_, errors) = resolve(&[c_required], |_| 16);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].1, ResolutionError::UnsatisfiedProvider(_, _)));

        let c_optional = input(2, &[], vec![Selector::new([("role", "src")])], Requires::None);
        let (_, errors) = resolve(&[c_optional], |_| 16);
        assert!(errors.is_empty());
    }

    #[test]
    fn users_requirement_needs_at_least_one_consumer() {
        let producer = input(1, &[("role", "src")], vec![], Requires::Users);
        let (_, errors) = resolve(&[producer], |_| 16);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].1, ResolutionError::UnsatisfiedConsumer(_)));
    }

    #[test]
    fn cycle_among_non_loop_safe_wants_is_detected() {
        let mut w1 = input(1, &[("id", "w1")], vec![Selector::new([("id", "w2")])], Requires::Providers);
        let w2 = input(2, &[("id", "w2")], vec![Selector::new([("id", "w1")])], Requires::Providers);
        w1.using = vec![Selector::new([("id", "w2")])];
        let (_, errors) = resolve(&[w1, w2], |_| 16);
        assert!(errors.iter().any(|(_, e)| matches!(e, ResolutionError::Cycle(_))));
    }

    #[test]
    fn loop_safe_wants_are_exempt_from_cycle_detection() {
        let mut w1 = input(1, &[("id", "w1")], vec![Selector::new([("id", "w2")])], Requires::Providers);
        w1.loop_safe = true;
        let mut w2 = input(2, &[("id", "w2")], vec![Selector::new([("id", "w1")])], Requires::Providers);
        w2.loop_safe = true;
        let (_, errors) = resolve(&[w1, w2], |_| 16);
        assert!(!errors.iter().any(|(_, e)| matches!(e, ResolutionError::Cycle(_))));
    }
}
