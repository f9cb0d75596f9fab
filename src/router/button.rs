//! Button Dispatcher — prefix matching over opaque component ids.
//!
//! Every binding whose prefix starts the id is invoked, in registration
//! order, and their replies are concatenated. No match is not an error: the
//! button belongs to someone else.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::trace;

use super::command::{guarded, with_ack};
use super::model::ButtonContext;
use super::module::{ButtonHandler, HandlerModule};
use super::reply::ReplyStream;

pub struct ButtonBinding {
    pub prefix: String,
    /// `Module::method`, for logs.
    pub method: String,
    pub handler: ButtonHandler,
    pub instance: Arc<dyn HandlerModule>,
}

#[derive(Default)]
pub struct ButtonDispatcher {
    bindings: Vec<Arc<ButtonBinding>>,
}

impl ButtonDispatcher {
    pub fn push(&mut self, binding: ButtonBinding) {
        self.bindings.push(Arc::new(binding));
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings matching `custom_id`, in registration order.
    pub fn matching(&self, custom_id: &str) -> Vec<Arc<ButtonBinding>> {
        self.bindings
            .iter()
            .filter(|b| custom_id.starts_with(&b.prefix))
            .cloned()
            .collect()
    }

    pub fn dispatch(&self, ctx: ButtonContext) -> ReplyStream {
        let matched = self.matching(ctx.custom_id());
        if matched.is_empty() {
            trace!(custom_id = %ctx.custom_id(), "no button listener matched");
            return stream::empty().boxed();
        }
        // Each listener runs only once the previous one's replies are drained.
        let replies = stream::iter(matched)
            .map(move |binding| {
                let ctx = ctx.clone();
                guarded(&binding.method, || (binding.handler)(ctx))
            })
            .flatten()
            .boxed();
        with_ack(replies)
    }
}
