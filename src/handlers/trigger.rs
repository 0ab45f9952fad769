//! `trigger` markers.
//!
//! A trigger names a registered hook that may rewrite the node. Unlike every
//! other directive the marker is kept, so the hook can re-examine its node on
//! later passes (and on replay after `ready`). Trigger activity therefore
//! never counts as resolution progress.

use tracing::warn;

use crate::block::Block;
use crate::directive::{self, Filter};
use crate::event_log::EventKind;

pub(crate) fn fire(block: &mut Block) {
    let hits = directive::find(&block.fragment, block.fragment.root(), directive::TRIGGER, Filter::All);
    let config = block.ctx.config.clone();

    for (node, name) in hits {
        if !block.fragment.is_attached(node) {
            continue;
        }
        match config.triggers.get(&name) {
            Some(f) => {
                f(block.object.as_ref(), &mut block.fragment, node);
                block.ctx.events.emit(EventKind::TriggerFired { name });
            }
            None => {
                // An unregistered trigger can never fire, so its marker goes.
                block.fragment.remove_attr(node, directive::TRIGGER);
                warn!(trigger = %name, "no such trigger registered");
            }
        }
    }
}
