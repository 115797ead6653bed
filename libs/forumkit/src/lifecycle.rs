//! Lifecycle stages and per-stage subscriber lists.

use std::fmt;

use crate::dispatcher::ModuleFailure;
use crate::request_context::RequestContext;

/// The six notifications a request context delivers over its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Init,
    PagePreLoad,
    PageInit,
    PageLoad,
    PageUnload,
    Unload,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Init,
        Stage::PagePreLoad,
        Stage::PageInit,
        Stage::PageLoad,
        Stage::PageUnload,
        Stage::Unload,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::PagePreLoad => "page_pre_load",
            Stage::PageInit => "page_init",
            Stage::PageLoad => "page_load",
            Stage::PageUnload => "page_unload",
            Stage::Unload => "unload",
        }
    }

    /// Stages raised by the attached page rather than by the context itself.
    pub fn is_page_stage(self) -> bool {
        matches!(
            self,
            Stage::PagePreLoad | Stage::PageInit | Stage::PageLoad | Stage::PageUnload
        )
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback attached to one stage. Receives the context that is firing.
pub type Subscriber = Box<dyn FnMut(&mut RequestContext) -> anyhow::Result<()>>;

/// Ordered subscriber lists, one per stage.
#[derive(Default)]
pub struct Subscribers {
    lists: [Vec<Subscriber>; 6],
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for stage in Stage::ALL {
            map.entry(&stage.as_str(), &self.lists[stage.index()].len());
        }
        map.finish()
    }
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, stage: Stage, subscriber: F)
    where
        F: FnMut(&mut RequestContext) -> anyhow::Result<()> + 'static,
    {
        self.lists[stage.index()].push(Box::new(subscriber));
    }

    pub fn len(&self, stage: Stage) -> usize {
        self.lists[stage.index()].len()
    }

    pub fn is_empty(&self, stage: Stage) -> bool {
        self.lists[stage.index()].is_empty()
    }

    /// Detach the list for `stage` so it can be run against the owning context.
    pub(crate) fn take(&mut self, stage: Stage) -> Vec<Subscriber> {
        std::mem::take(&mut self.lists[stage.index()])
    }

    /// Put a fired list back. Anything subscribed while it was out goes after it.
    pub(crate) fn restore(&mut self, stage: Stage, mut fired: Vec<Subscriber>) {
        let added = std::mem::take(&mut self.lists[stage.index()]);
        fired.extend(added);
        self.lists[stage.index()] = fired;
    }

    pub(crate) fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }
}

#[derive(Debug)]
pub struct SubscriberFailure {
    /// Position of the subscriber in its stage list.
    pub index: usize,
    pub error: String,
}

/// Outcome of firing one stage. Delivery never stops at a failure.
#[derive(Debug)]
pub struct StageReport {
    pub stage: Stage,
    pub delivered: usize,
    pub subscriber_failures: Vec<SubscriberFailure>,
    pub module_failures: Vec<ModuleFailure>,
}

impl StageReport {
    pub(crate) fn new(stage: Stage) -> Self {
        Self {
            stage,
            delivered: 0,
            subscriber_failures: Vec::new(),
            module_failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.subscriber_failures.is_empty() && self.module_failures.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.subscriber_failures.len() + self.module_failures.len()
    }
}
