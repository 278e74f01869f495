use rand::seq::index;
use tudey_schema::TargetConfig;

use super::region::RegionLogic;
use super::{LogicContext, LogicRef};
use crate::manager::SceneManager;

/// Resolves "who": zero or more live logics.
#[derive(Debug)]
pub enum TargetLogic {
    Source,
    Activator,
    Tagged { tag: String, limit: usize },
    Compound(Vec<TargetLogic>),
    Intersecting(Box<RegionLogic>),
}

impl TargetLogic {
    pub fn new(config: &TargetConfig) -> Self {
        match config {
            TargetConfig::Source => TargetLogic::Source,
            TargetConfig::Activator => TargetLogic::Activator,
            TargetConfig::Tagged { tag, limit } => TargetLogic::Tagged {
                tag: tag.clone(),
                limit: *limit,
            },
            TargetConfig::Compound { targets } => {
                TargetLogic::Compound(targets.iter().map(TargetLogic::new).collect())
            }
            TargetConfig::Intersecting { region } => {
                TargetLogic::Intersecting(Box::new(RegionLogic::new(region)))
            }
        }
    }

    /// Appends resolved targets to `results`, skipping ones already present.
    pub fn resolve(
        &self,
        manager: &mut SceneManager,
        context: &LogicContext,
        results: &mut Vec<LogicRef>,
    ) {
        let push = |results: &mut Vec<LogicRef>, logic: LogicRef| {
            if !results.contains(&logic) {
                results.push(logic);
            }
        };
        match self {
            TargetLogic::Source => {
                if manager.contains_logic(context.source) {
                    push(results, context.source);
                }
            }
            TargetLogic::Activator => {
                if let Some(activator) = context.activator {
                    if manager.contains_logic(activator) {
                        push(results, activator);
                    }
                }
            }
            TargetLogic::Tagged { tag, limit } => {
                let pool: Vec<LogicRef> = manager
                    .get_tagged(tag)
                    .into_iter()
                    .filter(|logic| manager.is_live(*logic))
                    .collect();
                if *limit == 0 || pool.len() <= *limit {
                    for logic in pool {
                        push(results, logic);
                    }
                    return;
                }
                let mut chosen = index::sample(manager.rng(), pool.len(), *limit).into_vec();
                chosen.sort_unstable();
                for position in chosen {
                    push(results, pool[position]);
                }
            }
            TargetLogic::Compound(targets) => {
                for target in targets {
                    target.resolve(manager, context, results);
                }
            }
            TargetLogic::Intersecting(region) => {
                let mut shapes = Vec::new();
                region.resolve(manager, context, &mut shapes);
                let mut found = Vec::new();
                for shape in &shapes {
                    manager.actors_intersecting(shape, &mut found);
                }
                for logic in found {
                    push(results, logic);
                }
            }
        }
    }

    /// First resolved target, if any.
    pub fn resolve_first(
        &self,
        manager: &mut SceneManager,
        context: &LogicContext,
    ) -> Option<LogicRef> {
        let mut results = Vec::new();
        self.resolve(manager, context, &mut results);
        results.first().copied()
    }
}
