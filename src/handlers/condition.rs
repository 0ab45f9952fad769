//! `condition` and `pre_condition` markers.
//!
//! Both name a registered predicate; a false result removes the node. A
//! pre-condition carrying `use_context` only runs when the block's context
//! identifier matches, otherwise its marker is left alone for whichever
//! block does own that context.

use tracing::error;

use crate::block::Block;
use crate::directive::{self, Filter};
use crate::event_log::EventKind;

pub(crate) fn resolve_pre_conditions(block: &mut Block) -> usize {
    run(block, directive::PRE_CONDITION, true)
}

pub(crate) fn resolve_conditions(block: &mut Block) -> usize {
    run(block, directive::CONDITION, false)
}

fn run(block: &mut Block, marker: &str, gate_on_context: bool) -> usize {
    let hits = directive::find(&block.fragment, block.fragment.root(), marker, Filter::All);
    let config = block.ctx.config.clone();
    let mut changed = 0;

    for (node, name) in hits {
        if !block.fragment.is_attached(node) {
            continue;
        }
        if gate_on_context {
            if let Some(wanted) = block.fragment.attr(node, directive::USE_CONTEXT) {
                if block.context.as_deref() != Some(wanted) {
                    continue;
                }
            }
        }

        block.fragment.remove_attr(node, marker);
        changed += 1;

        let keep = match config.conditions.get(&name) {
            Some(f) => f(block.object.as_ref(), &mut block.fragment, node),
            None => {
                error!(condition = %name, "no such condition registered; keeping node");
                true
            }
        };

        if keep {
            block.ctx.events.emit(EventKind::MarkerResolved {
                directive: marker.to_string(),
                value: name,
            });
        } else {
            block.fragment.detach(node);
            block.ctx.events.emit(EventKind::ConditionRemoved { name });
        }
    }
    changed
}
