//! Debounced single-flight paint coalescer.
//!
//! `PaintOrchestrator` is a pure state machine. It never sleeps or talks to
//! the network; every operation returns the [`PaintCommand`]s the caller
//! must carry out (arm a timer, send a request, clear the display) and every
//! asynchronous completion is fed back in with the token or generation it
//! was issued with.
//!
//! Rules:
//! - continuous changes (color, opacity, main-walls-only) restart a debounce
//!   window and only the last snapshot fires;
//! - discrete changes (wall selection) fire immediately;
//! - at most one call is in flight; triggers arriving meanwhile collapse into
//!   a single follow-up snapshot issued when the call completes;
//! - only the response of the most recently issued call is applied, and only
//!   when nothing newer is waiting.

use std::time::Duration;
use wallpaint_core::error::ServiceFailure;
use wallpaint_core::image::ImageHash;
use wallpaint_core::paint::{PaintParameters, PaintTimings, PaintedArtifact};
use wallpaint_core::service::{PaintOutcome, PaintRequest, ServiceResult};

/// Which class of parameter changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Color, opacity, main-walls-only: debounced.
    Continuous,
    /// Wall selection: fires immediately.
    Discrete,
}

/// Parameters bound to the detected image they apply to.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintSnapshot {
    pub image_hash: ImageHash,
    pub params: PaintParameters,
}

/// A paint call the caller must send.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintTicket {
    pub generation: u64,
    pub request: PaintRequest,
    pub params: PaintParameters,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    /// (Re)arm the debounce timer; call `debounce_elapsed(token)` when it fires.
    ScheduleDebounce { token: u64, delay: Duration },
    /// Disarm the debounce timer.
    CancelDebounce,
    /// Send the paint request; call `complete(generation, ..)` with its result.
    Issue(PaintTicket),
    /// The selection became empty; the displayed artifact is gone.
    ClearDisplay,
}

/// What happened to a completed call.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The response became the displayed artifact.
    Applied,
    /// The response was an error and is now the displayed error.
    Failed(ServiceFailure),
    /// The response was superseded and dropped.
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub completion: Completion,
    pub timings: PaintTimings,
    pub commands: Vec<PaintCommand>,
}

/// Coarse phase, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    /// Debounce window open.
    Pending,
    InFlight,
    Settled,
}

#[derive(Debug, Clone)]
struct InFlight {
    generation: u64,
    params: PaintParameters,
}

#[derive(Debug)]
pub struct PaintOrchestrator {
    debounce: Duration,
    debounce_token: u64,
    debouncing: Option<PaintSnapshot>,
    in_flight: Option<InFlight>,
    follow_up: Option<PaintSnapshot>,
    last_generation: u64,
    /// Generation whose response may still be applied.
    applicable: Option<u64>,
    artifact: Option<PaintedArtifact>,
    last_error: Option<ServiceFailure>,
    timings: Option<PaintTimings>,
    settled: bool,
    issued: u64,
}

impl PaintOrchestrator {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            debounce_token: 0,
            debouncing: None,
            in_flight: None,
            follow_up: None,
            last_generation: 0,
            applicable: None,
            artifact: None,
            last_error: None,
            timings: None,
            settled: false,
            issued: 0,
        }
    }

    /// Reacts to a parameter change.
    pub fn trigger(&mut self, snapshot: PaintSnapshot, kind: TriggerKind) -> Vec<PaintCommand> {
        if !snapshot.params.has_walls() {
            return self.clear_display();
        }

        match kind {
            TriggerKind::Continuous => {
                self.debounce_token += 1;
                self.debouncing = Some(snapshot);
                vec![PaintCommand::ScheduleDebounce {
                    token: self.debounce_token,
                    delay: self.debounce,
                }]
            }
            TriggerKind::Discrete => {
                // The discrete snapshot already carries the latest continuous values.
                let mut commands = self.cancel_debounce();
                commands.extend(self.dispatch(snapshot));
                commands
            }
        }
    }

    /// The debounce timer armed with `token` fired.
    pub fn debounce_elapsed(&mut self, token: u64) -> Vec<PaintCommand> {
        if token != self.debounce_token {
            return Vec::new();
        }
        match self.debouncing.take() {
            Some(snapshot) => self.dispatch(snapshot),
            None => Vec::new(),
        }
    }

    /// Feeds back the result of the call issued as `generation`.
    ///
    /// Returns `None` when `generation` is not the call in flight (it was
    /// abandoned by a reset).
    pub fn complete(
        &mut self,
        generation: u64,
        result: ServiceResult<PaintOutcome>,
        round_trip: Duration,
    ) -> Option<CompletionReport> {
        if self.in_flight.as_ref().map(|call| call.generation) != Some(generation) {
            tracing::debug!(
                "[Paint] Ignoring completion of abandoned call #{} ({:?})",
                generation,
                round_trip
            );
            return None;
        }
        let call = self.in_flight.take()?;

        let timings = PaintTimings {
            round_trip,
            service_time: result.as_ref().ok().and_then(|outcome| outcome.service_time),
        };
        self.timings = Some(timings);

        let superseded = self.applicable != Some(generation)
            || self.follow_up.is_some()
            || self.debouncing.is_some();

        let completion = if superseded {
            Completion::Discarded
        } else {
            self.settled = true;
            match result {
                Ok(outcome) => {
                    self.artifact = Some(PaintedArtifact {
                        image: outcome.image,
                        walls_painted: outcome.walls_painted,
                        params: call.params,
                    });
                    self.last_error = None;
                    Completion::Applied
                }
                Err(failure) => {
                    self.last_error = Some(failure.clone());
                    Completion::Failed(failure)
                }
            }
        };

        let commands = match self.follow_up.take() {
            Some(snapshot) => self.issue(snapshot),
            None => Vec::new(),
        };

        Some(CompletionReport {
            completion,
            timings,
            commands,
        })
    }

    /// Drops an issued call that could not be sent.
    pub fn abandon(&mut self, generation: u64) -> Vec<PaintCommand> {
        if self.in_flight.as_ref().map(|call| call.generation) != Some(generation) {
            return Vec::new();
        }
        self.in_flight = None;
        if self.applicable == Some(generation) {
            self.applicable = None;
        }
        match self.follow_up.take() {
            Some(snapshot) => self.issue(snapshot),
            None => Vec::new(),
        }
    }

    /// Forgets everything belonging to the current image.
    ///
    /// Generations keep counting up so that responses to calls issued
    /// before the reset are recognized as stale.
    pub fn reset(&mut self) -> Vec<PaintCommand> {
        let commands = self.cancel_debounce();
        self.in_flight = None;
        self.follow_up = None;
        self.applicable = None;
        self.artifact = None;
        self.last_error = None;
        self.timings = None;
        self.settled = false;
        commands
    }

    pub fn state(&self) -> OrchestratorState {
        if self.in_flight.is_some() {
            OrchestratorState::InFlight
        } else if self.debouncing.is_some() {
            OrchestratorState::Pending
        } else if self.settled {
            OrchestratorState::Settled
        } else {
            OrchestratorState::Idle
        }
    }

    /// Whether a call is waiting on the timer, in flight, or queued.
    pub fn is_busy(&self) -> bool {
        self.debouncing.is_some() || self.in_flight.is_some() || self.follow_up.is_some()
    }

    pub fn artifact(&self) -> Option<&PaintedArtifact> {
        self.artifact.as_ref()
    }

    pub fn last_error(&self) -> Option<&ServiceFailure> {
        self.last_error.as_ref()
    }

    pub fn timings(&self) -> Option<PaintTimings> {
        self.timings
    }

    /// Number of calls issued so far, across resets.
    pub fn paint_count(&self) -> u64 {
        self.issued
    }

    fn dispatch(&mut self, snapshot: PaintSnapshot) -> Vec<PaintCommand> {
        if let Some(call) = &self.in_flight {
            tracing::debug!(
                "[Paint] Call #{} in flight, holding follow-up",
                call.generation
            );
            self.follow_up = Some(snapshot);
            return Vec::new();
        }
        self.issue(snapshot)
    }

    fn issue(&mut self, snapshot: PaintSnapshot) -> Vec<PaintCommand> {
        self.last_generation += 1;
        self.issued += 1;
        let generation = self.last_generation;

        self.in_flight = Some(InFlight {
            generation,
            params: snapshot.params.clone(),
        });
        self.applicable = Some(generation);

        vec![PaintCommand::Issue(PaintTicket {
            generation,
            request: PaintRequest::new(snapshot.image_hash, &snapshot.params),
            params: snapshot.params,
        })]
    }

    fn cancel_debounce(&mut self) -> Vec<PaintCommand> {
        if self.debouncing.take().is_some() {
            self.debounce_token += 1;
            vec![PaintCommand::CancelDebounce]
        } else {
            Vec::new()
        }
    }

    fn clear_display(&mut self) -> Vec<PaintCommand> {
        let mut commands = self.cancel_debounce();
        self.follow_up = None;
        // A call still in flight stays single-flight but its response is void.
        self.applicable = None;
        self.artifact = None;
        self.last_error = None;
        self.settled = false;
        commands.push(PaintCommand::ClearDisplay);
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use wallpaint_core::paint::{HexColor, Opacity};

    const WINDOW: Duration = Duration::from_millis(300);

    fn snapshot(opacity: f32, walls: &[usize]) -> PaintSnapshot {
        PaintSnapshot {
            image_hash: ImageHash::new("hash"),
            params: PaintParameters {
                color: HexColor::default(),
                opacity: Opacity::new(opacity).unwrap(),
                main_walls_only: false,
                wall_ids: walls.iter().copied().collect::<BTreeSet<_>>(),
            },
        }
    }

    fn ok(image: &str) -> ServiceResult<PaintOutcome> {
        Ok(PaintOutcome {
            image: image.to_string(),
            walls_painted: 1,
            service_time: Some(Duration::from_millis(40)),
        })
    }

    fn issued(commands: &[PaintCommand]) -> Vec<PaintTicket> {
        commands
            .iter()
            .filter_map(|command| match command {
                PaintCommand::Issue(ticket) => Some(ticket.clone()),
                _ => None,
            })
            .collect()
    }

    fn token_of(commands: &[PaintCommand]) -> u64 {
        commands
            .iter()
            .find_map(|command| match command {
                PaintCommand::ScheduleDebounce { token, .. } => Some(*token),
                _ => None,
            })
            .expect("debounce scheduled")
    }

    #[test]
    fn test_discrete_trigger_issues_immediately() {
        let mut orchestrator = PaintOrchestrator::new(WINDOW);
        let commands = orchestrator.trigger(snapshot(0.7, &[0, 1]), TriggerKind::Discrete);

        let tickets = issued(&commands);
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].request.wall_ids, BTreeSet::from([0, 1]));
        assert_eq!(orchestrator.state(), OrchestratorState::InFlight);
    }

    #[test]
    fn test_continuous_triggers_coalesce_to_last_value() {
        let mut orchestrator = PaintOrchestrator::new(WINDOW);
        let mut tokens = Vec::new();
        for opacity in [0.2, 0.3, 0.4, 0.5, 0.6] {
            let commands = orchestrator.trigger(snapshot(opacity, &[0]), TriggerKind::Continuous);
            assert!(issued(&commands).is_empty());
            assert_eq!(
                commands,
                vec![PaintCommand::ScheduleDebounce {
                    token: token_of(&commands),
                    delay: WINDOW
                }]
            );
            tokens.push(token_of(&commands));
        }
        assert_eq!(orchestrator.state(), OrchestratorState::Pending);

        // Stale timers fire first and do nothing.
        for token in &tokens[..4] {
            assert!(orchestrator.debounce_elapsed(*token).is_empty());
        }
        let tickets = issued(&orchestrator.debounce_elapsed(tokens[4]));
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].params.opacity.value(), 0.6);
        assert_eq!(orchestrator.paint_count(), 1);
    }

    #[test]
    fn test_trigger_while_in_flight_becomes_single_follow_up() {
        let mut orchestrator = PaintOrchestrator::new(WINDOW);
        let first = issued(&orchestrator.trigger(snapshot(0.7, &[0, 1]), TriggerKind::Discrete));

        assert!(issued(&orchestrator.trigger(snapshot(0.7, &[0]), TriggerKind::Discrete)).is_empty());
        assert!(issued(&orchestrator.trigger(snapshot(0.7, &[1]), TriggerKind::Discrete)).is_empty());
        assert_eq!(orchestrator.paint_count(), 1);

        let report = orchestrator
            .complete(first[0].generation, ok("first"), Duration::from_millis(80))
            .unwrap();
        // The first response is stale: a newer snapshot was waiting.
        assert_eq!(report.completion, Completion::Discarded);
        assert!(orchestrator.artifact().is_none());

        let follow_up = issued(&report.commands);
        assert_eq!(follow_up.len(), 1);
        assert_eq!(follow_up[0].request.wall_ids, BTreeSet::from([1]));

        let report = orchestrator
            .complete(follow_up[0].generation, ok("second"), Duration::from_millis(80))
            .unwrap();
        assert_eq!(report.completion, Completion::Applied);
        let artifact = orchestrator.artifact().unwrap();
        assert_eq!(artifact.image, "second");
        assert_eq!(artifact.params.wall_ids, BTreeSet::from([1]));
        assert_eq!(orchestrator.state(), OrchestratorState::Settled);
        assert!(!orchestrator.is_busy());
    }

    #[test]
    fn test_open_debounce_window_supersedes_in_flight_result() {
        let mut orchestrator = PaintOrchestrator::new(WINDOW);
        let first = issued(&orchestrator.trigger(snapshot(0.7, &[0]), TriggerKind::Discrete));
        let token = token_of(&orchestrator.trigger(snapshot(0.3, &[0]), TriggerKind::Continuous));

        let report = orchestrator
            .complete(first[0].generation, ok("first"), Duration::from_millis(10))
            .unwrap();
        assert_eq!(report.completion, Completion::Discarded);
        assert!(report.commands.is_empty());

        let second = issued(&orchestrator.debounce_elapsed(token));
        assert_eq!(second[0].params.opacity.value(), 0.3);
    }

    #[test]
    fn test_discrete_trigger_cancels_open_window() {
        let mut orchestrator = PaintOrchestrator::new(WINDOW);
        let token = token_of(&orchestrator.trigger(snapshot(0.3, &[0, 1]), TriggerKind::Continuous));

        let commands = orchestrator.trigger(snapshot(0.3, &[0]), TriggerKind::Discrete);
        assert_eq!(commands[0], PaintCommand::CancelDebounce);
        assert_eq!(issued(&commands).len(), 1);

        assert!(orchestrator.debounce_elapsed(token).is_empty());
        assert_eq!(orchestrator.paint_count(), 1);
    }

    #[test]
    fn test_empty_selection_clears_without_call() {
        let mut orchestrator = PaintOrchestrator::new(WINDOW);
        let first = issued(&orchestrator.trigger(snapshot(0.7, &[0]), TriggerKind::Discrete));
        orchestrator.complete(first[0].generation, ok("painted"), Duration::from_millis(5));
        assert!(orchestrator.artifact().is_some());

        let commands = orchestrator.trigger(snapshot(0.7, &[]), TriggerKind::Discrete);
        assert_eq!(commands, vec![PaintCommand::ClearDisplay]);
        assert!(orchestrator.artifact().is_none());
        assert!(orchestrator.last_error().is_none());
        assert_eq!(orchestrator.paint_count(), 1);
    }

    #[test]
    fn test_empty_selection_voids_in_flight_response() {
        let mut orchestrator = PaintOrchestrator::new(WINDOW);
        let first = issued(&orchestrator.trigger(snapshot(0.7, &[0]), TriggerKind::Discrete));
        orchestrator.trigger(snapshot(0.7, &[]), TriggerKind::Discrete);

        let report = orchestrator
            .complete(first[0].generation, ok("late"), Duration::from_millis(5))
            .unwrap();
        assert_eq!(report.completion, Completion::Discarded);
        assert!(orchestrator.artifact().is_none());
    }

    #[test]
    fn test_failure_keeps_artifact_and_does_not_block() {
        let mut orchestrator = PaintOrchestrator::new(WINDOW);
        let first = issued(&orchestrator.trigger(snapshot(0.7, &[0]), TriggerKind::Discrete));
        orchestrator.complete(first[0].generation, ok("good"), Duration::from_millis(5));

        let second = issued(&orchestrator.trigger(snapshot(0.5, &[0]), TriggerKind::Discrete));
        let report = orchestrator
            .complete(
                second[0].generation,
                Err(ServiceFailure::service_error("Painting failed")),
                Duration::from_millis(5),
            )
            .unwrap();
        assert!(matches!(report.completion, Completion::Failed(_)));
        assert_eq!(orchestrator.artifact().unwrap().image, "good");
        assert_eq!(orchestrator.last_error().unwrap().message, "Painting failed");

        let third = issued(&orchestrator.trigger(snapshot(0.4, &[0]), TriggerKind::Discrete));
        assert_eq!(third.len(), 1);
        orchestrator.complete(third[0].generation, ok("better"), Duration::from_millis(5));
        assert!(orchestrator.last_error().is_none());
        assert_eq!(orchestrator.artifact().unwrap().image, "better");
    }

    #[test]
    fn test_reset_abandons_in_flight_call() {
        let mut orchestrator = PaintOrchestrator::new(WINDOW);
        let first = issued(&orchestrator.trigger(snapshot(0.7, &[0]), TriggerKind::Discrete));
        orchestrator.reset();

        assert!(
            orchestrator
                .complete(first[0].generation, ok("late"), Duration::from_millis(5))
                .is_none()
        );
        assert!(orchestrator.artifact().is_none());
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);

        let next = issued(&orchestrator.trigger(snapshot(0.7, &[0]), TriggerKind::Discrete));
        assert!(next[0].generation > first[0].generation);
    }

    #[test]
    fn test_reset_cancels_open_window() {
        let mut orchestrator = PaintOrchestrator::new(WINDOW);
        let token = token_of(&orchestrator.trigger(snapshot(0.3, &[0]), TriggerKind::Continuous));
        assert_eq!(orchestrator.reset(), vec![PaintCommand::CancelDebounce]);
        assert!(orchestrator.debounce_elapsed(token).is_empty());
        assert!(!orchestrator.is_busy());
    }

    #[test]
    fn test_abandon_releases_single_flight_slot() {
        let mut orchestrator = PaintOrchestrator::new(WINDOW);
        let first = issued(&orchestrator.trigger(snapshot(0.7, &[0]), TriggerKind::Discrete));
        orchestrator.trigger(snapshot(0.7, &[1]), TriggerKind::Discrete);

        let next = issued(&orchestrator.abandon(first[0].generation));
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].request.wall_ids, BTreeSet::from([1]));
    }
}
