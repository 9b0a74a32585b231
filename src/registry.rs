//! Stub registry and best-match selection.

use crate::request::RecordedRequest;
use crate::response::ResponseSpec;
use crate::stub::Stub;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registry shared between the server, the dispatcher and stub handles.
pub(crate) type SharedRegistry = Arc<Mutex<Registry>>;

/// Lock the registry, recovering it if a panicking thread poisoned the lock.
pub(crate) fn lock(registry: &SharedRegistry) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered, append-only list of stubs.
#[derive(Debug)]
pub struct Registry {
    stubs: Vec<Stub>,
    all_consumed: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            stubs: Vec::new(),
            all_consumed: true,
        }
    }
}

/// A stub that won a request, with the response it should produce.
#[derive(Debug)]
pub struct Consumed {
    /// Registration index of the winning stub
    pub index: usize,
    pub response: ResponseSpec,
}

impl Registry {
    /// Append a stub and return its index.
    pub fn push(&mut self, stub: Stub) -> usize {
        self.all_consumed = false;
        self.stubs.push(stub);
        self.stubs.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Stub> {
        self.stubs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Stub> {
        self.stubs.get_mut(index)
    }

    pub fn stubs(&self) -> &[Stub] {
        &self.stubs
    }

    /// True when every registered stub has been consumed.
    pub fn all_consumed(&self) -> bool {
        self.all_consumed
    }

    /// Number of stubs still waiting for a request.
    pub fn pending(&self) -> usize {
        self.stubs.iter().filter(|stub| !stub.consumed).count()
    }

    /// Select the best stub for a request, mark it consumed and hand back
    /// its response.
    pub fn consume_best(&mut self, request: &RecordedRequest) -> Option<Consumed> {
        let index = select_best(request, &self.stubs)?;
        let stub = &mut self.stubs[index];
        stub.consumed = true;
        let response = stub.response.clone();
        self.all_consumed = self.stubs.iter().all(|stub| stub.consumed);
        Some(Consumed { index, response })
    }

    /// Numbered listing of every stub, flagging consumed ones.
    pub fn stub_list(&self) -> String {
        let mut list = String::new();
        for (i, stub) in self.stubs.iter().enumerate() {
            list.push_str(&format!("{}. {}", i + 1, stub));
            if stub.consumed {
                list.push_str(" (matched)");
            }
            list.push('\n');
        }
        list
    }

    /// Failure message for a request no stub accepted.
    pub fn unregistered_request_message(&self, request: &RecordedRequest) -> String {
        format!(
            "\n\nUnregistered request: {}\n\nstubbed requests: \n\n{}",
            request,
            self.stub_list()
        )
    }

    /// Failure message for stubs left unmatched at verification.
    pub fn unmatched_stubs_message(&self) -> String {
        format!(
            "\n\nNot all stubs have been matched: \n\n{}",
            self.stub_list()
        )
    }
}

/// Index of the highest-scoring unconsumed stub.
///
/// Ties go to the stub registered first.
pub fn select_best(request: &RecordedRequest, stubs: &[Stub]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;

    for (index, stub) in stubs.iter().enumerate() {
        if stub.consumed {
            continue;
        }

        let Some(score) = stub.score(request) else {
            continue;
        };
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    best.map(|(index, _)| index)
}
