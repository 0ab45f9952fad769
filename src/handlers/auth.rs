//! `auth` markers.
//!
//! Visibility by viewer group. The marker value is informational only; the
//! default is to allow. A `deny-all` class flips that default, keeping the
//! node only when an `allow-<group>` class matches the viewer; otherwise a
//! `deny-<group>` class removes it for members of that group.

use crate::block::Block;
use crate::directive::{self, Filter};
use crate::event_log::EventKind;

pub(crate) fn resolve(block: &mut Block) -> usize {
    let hits = directive::find(&block.fragment, block.fragment.root(), directive::AUTH, Filter::All);
    let groups = block.ctx.config.viewer_groups.clone();
    let mut changed = 0;

    for (node, value) in hits {
        if !block.fragment.is_attached(node) {
            continue;
        }
        block.fragment.remove_attr(node, directive::AUTH);
        changed += 1;

        let allowed = if block.fragment.has_class(node, directive::CLASS_DENY_ALL) {
            block
                .fragment
                .classes(node)
                .iter()
                .filter_map(|c| c.strip_prefix("allow-"))
                .any(|g| groups.iter().any(|h| h == g))
        } else {
            !block
                .fragment
                .classes(node)
                .iter()
                .filter_map(|c| c.strip_prefix("deny-"))
                .any(|g| groups.iter().any(|h| h == g))
        };

        if allowed {
            block.ctx.events.emit(EventKind::MarkerResolved {
                directive: directive::AUTH.to_string(),
                value,
            });
        } else {
            block.fragment.detach(node);
            block.ctx.events.emit(EventKind::AuthDenied);
        }
    }
    changed
}
