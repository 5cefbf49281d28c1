// PlaybackOrchestrator - crossfading transport over an ordered playlist
//
// Phases: Idle -> Loading -> Ready -> Playing <-> Paused -> Ended
//
// Switching segments while playing is a fade-out of the active segment, a
// switch, a wait for the new source to be ready, and a fade-in. Only one
// segment ever carries gain. A request arriving mid-switch kills the running
// ramp and starts over from the gain reached so far.

use std::time::Duration;

use tokio::sync::oneshot;

use super::output::{AudioOutput, SourceStatus};
use super::ramp::{Easing, GainRamp};
use super::{FadeCompletion, PlaybackEvent, PlaybackPhase};
use crate::config::PlaybackConfig;
use crate::error::{log_playback_error, PlaybackError};
use crate::manifest::{PoolLayout, Segment};

/// Result of an advance request coming from the gallery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Switching to this segment
    Advancing(usize),
    /// Another advance is already in flight; request ignored
    Coalesced,
    /// No later segment shows a different pool; playlist finished
    AllComplete,
    /// Nothing loaded
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SwitchTarget {
    index: usize,
    local_time: f64,
    resume: bool,
    automatic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AfterRamp {
    Hold,
    PauseOutput,
    Switch(SwitchTarget),
    FinishPlaylist,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    ramp: GainRamp,
    then: AfterRamp,
}

#[derive(Debug, Clone)]
struct SourceState {
    prepared: bool,
    status: SourceStatus,
    reported_progress: f64,
}

impl Default for SourceState {
    fn default() -> Self {
        Self {
            prepared: false,
            status: SourceStatus::Unprepared,
            reported_progress: -1.0,
        }
    }
}

pub struct PlaybackOrchestrator {
    config: PlaybackConfig,
    output: Box<dyn AudioOutput>,
    segments: Vec<Segment>,
    layout: PoolLayout,
    sources: Vec<SourceState>,
    phase: PlaybackPhase,
    current: usize,
    fade_gain: f32,
    volume: f32,
    target_volume: f32,
    volume_ramp: Option<GainRamp>,
    transition: Option<Transition>,
    pending_switch: Option<SwitchTarget>,
    pending_position: Option<f64>,
    advance_in_progress: bool,
    ended_reported: Option<usize>,
    waiters: Vec<oneshot::Sender<()>>,
    events: Vec<PlaybackEvent>,
}

impl PlaybackOrchestrator {
    pub fn new(config: PlaybackConfig, output: Box<dyn AudioOutput>) -> Self {
        let volume = config.initial_volume.clamp(0.0, 1.0);
        Self {
            config,
            output,
            segments: Vec::new(),
            layout: PoolLayout::default(),
            sources: Vec::new(),
            phase: PlaybackPhase::Idle,
            current: 0,
            fade_gain: 0.0,
            volume,
            target_volume: volume,
            volume_ramp: None,
            transition: None,
            pending_switch: None,
            pending_position: None,
            advance_in_progress: false,
            ended_reported: None,
            waiters: Vec::new(),
            events: Vec::new(),
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }

    pub fn current_segment_index(&self) -> usize {
        self.current
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn output(&self) -> &dyn AudioOutput {
        self.output.as_ref()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn target_volume(&self) -> f32 {
        self.target_volume
    }

    pub fn advance_in_progress(&self) -> bool {
        self.advance_in_progress
    }

    /// True while a fade or segment switch is running.
    pub fn in_transition(&self) -> bool {
        self.transition.is_some() || self.pending_switch.is_some()
    }

    pub fn segment_duration(&self, index: usize) -> Option<f64> {
        self.sources.get(index).and_then(|s| s.status.duration())
    }

    /// Position inside the active segment, in seconds.
    pub fn elapsed(&self) -> f64 {
        if self.segments.is_empty() {
            return 0.0;
        }
        self.output.position(self.current)
    }

    /// Sum of known segment durations.
    pub fn total_duration(&self) -> f64 {
        (0..self.segments.len())
            .map(|i| self.segment_duration(i).unwrap_or(0.0))
            .sum()
    }

    /// Durations of all previous segments plus the position in the active one.
    pub fn total_elapsed(&self) -> f64 {
        let before: f64 = (0..self.current)
            .map(|i| self.segment_duration(i).unwrap_or(0.0))
            .sum();
        before + self.elapsed()
    }

    /// Resolve a playlist-wide time to `(segment, local time)`.
    ///
    /// Searches the cumulative start times from the last segment backwards.
    pub fn resolve_global_time(&self, seconds: f64) -> Option<(usize, f64)> {
        if self.segments.is_empty() {
            return None;
        }
        let target = seconds.clamp(0.0, self.total_duration());
        let mut starts = Vec::with_capacity(self.segments.len());
        let mut acc = 0.0;
        for i in 0..self.segments.len() {
            starts.push(acc);
            acc += self.segment_duration(i).unwrap_or(0.0);
        }
        for i in (0..self.segments.len()).rev() {
            if target >= starts[i] {
                let local = target - starts[i];
                let local = match self.segment_duration(i) {
                    Some(duration) => local.min(duration),
                    None => local,
                };
                return Some((i, local));
            }
        }
        Some((0, 0.0))
    }

    // ========================================================================
    // CONTROLS
    // ========================================================================

    /// Install a playlist and start buffering the first segments.
    ///
    /// Pools are resolved from the segments' own subgroups; use
    /// `load_with_layout` to share the gallery's layout.
    pub fn load(&mut self, segments: Vec<Segment>, now: Duration) -> Result<(), PlaybackError> {
        let layout = PoolLayout::from_segments(&segments);
        self.load_with_layout(segments, layout, now)
    }

    /// Install a playlist whose segment-to-pool mapping is `layout`.
    pub fn load_with_layout(
        &mut self,
        segments: Vec<Segment>,
        layout: PoolLayout,
        now: Duration,
    ) -> Result<(), PlaybackError> {
        if !matches!(self.phase, PlaybackPhase::Idle | PlaybackPhase::Ended) {
            return Err(PlaybackError::InvalidState {
                operation: "load",
                phase: self.phase,
            });
        }
        if segments.is_empty() {
            return Err(PlaybackError::EmptyPlaylist);
        }

        self.kill_transition(now);
        self.sources = vec![SourceState::default(); segments.len()];
        self.segments = segments;
        self.layout = layout;
        self.current = 0;
        self.fade_gain = 0.0;
        self.pending_switch = None;
        self.pending_position = None;
        self.advance_in_progress = false;
        self.ended_reported = None;

        tracing::info!("[Playback] Loading playlist of {} segments", self.segments.len());
        self.set_phase(PlaybackPhase::Loading);
        self.prepare_ahead();
        self.events.push(PlaybackEvent::SegmentChanged {
            previous: None,
            current: 0,
            automatic: false,
        });
        Ok(())
    }

    /// Start or resume output with a fade-in.
    pub fn play(&mut self, now: Duration) -> Result<FadeCompletion, PlaybackError> {
        match self.phase {
            PlaybackPhase::Playing => Ok(FadeCompletion::completed()),
            PlaybackPhase::Ready | PlaybackPhase::Paused => {
                if let Some(target) = self.pending_switch.as_mut() {
                    target.resume = true;
                    self.set_phase(PlaybackPhase::Playing);
                    return Ok(self.register_waiter());
                }
                if let Some(Transition {
                    then: AfterRamp::Switch(target),
                    ..
                }) = self.transition.as_mut()
                {
                    target.resume = true;
                    self.set_phase(PlaybackPhase::Playing);
                    return Ok(self.register_waiter());
                }

                self.kill_transition(now);
                if let Err(err) = self.output.start(self.current) {
                    log_playback_error(&err, "play");
                    return Err(err);
                }
                self.set_phase(PlaybackPhase::Playing);
                self.start_ramp(1.0, self.config.play_fade_in_ms, Easing::SineOut, AfterRamp::Hold, now);
                Ok(self.register_waiter())
            }
            phase => Err(PlaybackError::InvalidState {
                operation: "play",
                phase,
            }),
        }
    }

    /// Fade out and stop output. The completion resolves once the ramp ends.
    pub fn pause(&mut self, now: Duration) -> Result<FadeCompletion, PlaybackError> {
        match self.phase {
            PlaybackPhase::Paused => Ok(FadeCompletion::completed()),
            PlaybackPhase::Playing => {
                self.set_phase(PlaybackPhase::Paused);
                if let Some(target) = self.pending_switch.as_mut() {
                    target.resume = false;
                    return Ok(self.register_waiter());
                }
                let then = match self.transition {
                    Some(Transition {
                        then: AfterRamp::Switch(target),
                        ..
                    }) => AfterRamp::Switch(SwitchTarget {
                        resume: false,
                        ..target
                    }),
                    _ => AfterRamp::PauseOutput,
                };
                self.kill_transition(now);
                self.start_ramp(0.0, self.config.pause_fade_out_ms, Easing::QuadIn, then, now);
                Ok(self.register_waiter())
            }
            phase => Err(PlaybackError::InvalidState {
                operation: "pause",
                phase,
            }),
        }
    }

    pub fn toggle(&mut self, now: Duration) -> Result<FadeCompletion, PlaybackError> {
        if self.is_playing() {
            self.pause(now)
        } else {
            self.play(now)
        }
    }

    /// Jump to `local_time` seconds into segment `index`.
    pub fn seek_to(&mut self, index: usize, local_time: f64, now: Duration) -> Result<(), PlaybackError> {
        self.seek_internal(index, local_time, false, now)
    }

    pub fn seek_to_global_time(&mut self, seconds: f64, now: Duration) -> Result<(), PlaybackError> {
        let (index, local) = self
            .resolve_global_time(seconds)
            .ok_or(PlaybackError::NotLoaded)?;
        tracing::debug!(
            "[Playback] Global time {:.2}s resolves to segment {} at {:.2}s",
            seconds,
            index,
            local
        );
        self.seek_internal(index, local, false, now)
    }

    /// Move the position inside the active segment, clamped to its bounds.
    pub fn nudge(&mut self, delta_seconds: f64) -> Result<(), PlaybackError> {
        if self.segments.is_empty() {
            return Err(PlaybackError::NotLoaded);
        }
        let Some(duration) = self.segment_duration(self.current) else {
            return Err(PlaybackError::InvalidState {
                operation: "nudge",
                phase: self.phase,
            });
        };
        let target = (self.output.position(self.current) + delta_seconds).clamp(0.0, duration);
        self.output.seek(self.current, target);
        if self.ended_reported == Some(self.current) && target < duration {
            self.ended_reported = None;
        }
        Ok(())
    }

    pub fn nudge_forward(&mut self) -> Result<(), PlaybackError> {
        self.nudge(self.config.nudge_seconds)
    }

    pub fn nudge_backward(&mut self) -> Result<(), PlaybackError> {
        self.nudge(-self.config.nudge_seconds)
    }

    /// Ramp master volume to `volume`.
    pub fn set_volume(&mut self, volume: f32, now: Duration) {
        let target = volume.clamp(0.0, 1.0);
        self.target_volume = target;
        self.volume_ramp = Some(GainRamp::new(
            self.volume,
            target,
            now,
            Duration::from_millis(self.config.volume_ramp_ms),
            Easing::Linear,
        ));
    }

    pub fn step_volume(&mut self, up: bool, now: Duration) {
        let step = if up {
            self.config.volume_step
        } else {
            -self.config.volume_step
        };
        self.set_volume(self.target_volume + step, now);
    }

    /// Handle a pool-exhausted signal: move to the next segment showing a
    /// different pool, or finish the playlist if none exists.
    pub fn request_advance(&mut self, completed_pool: &str, now: Duration) -> AdvanceOutcome {
        if self.segments.is_empty() {
            return AdvanceOutcome::Rejected;
        }
        if self.advance_in_progress || self.in_transition_to_other_segment() {
            tracing::warn!(
                "[Playback] Advance for pool '{}' coalesced, transition in flight",
                completed_pool
            );
            return AdvanceOutcome::Coalesced;
        }

        let next = (self.current + 1..self.segments.len()).find(|&i| {
            self.layout.active_pool(i).map(String::as_str) != Some(completed_pool)
                && !self.sources[i].status.is_failed()
        });

        match next {
            Some(index) => {
                tracing::info!(
                    "[Playback] Pool '{}' complete, advancing {} -> {}",
                    completed_pool,
                    self.current,
                    index
                );
                match self.seek_internal(index, 0.0, true, now) {
                    Ok(()) => AdvanceOutcome::Advancing(index),
                    Err(err) => {
                        log_playback_error(&err, "request_advance");
                        AdvanceOutcome::Rejected
                    }
                }
            }
            None => {
                self.complete_playlist(now);
                AdvanceOutcome::AllComplete
            }
        }
    }

    /// Fade out and end the playlist, signalling `AllComplete`.
    pub fn complete_playlist(&mut self, now: Duration) {
        if self.segments.is_empty() || self.phase == PlaybackPhase::Ended {
            return;
        }
        tracing::info!("[Playback] Playlist complete");
        self.events.push(PlaybackEvent::AllComplete);
        self.pending_switch = None;
        self.pending_position = None;
        if self.phase == PlaybackPhase::Playing {
            self.kill_transition(now);
            self.advance_in_progress = true;
            self.start_ramp(
                0.0,
                self.config.pause_fade_out_ms,
                Easing::QuadIn,
                AfterRamp::FinishPlaylist,
                now,
            );
        } else {
            self.kill_transition(now);
            self.output.pause(self.current);
            self.advance_in_progress = false;
            self.set_phase(PlaybackPhase::Ended);
        }
    }

    // ========================================================================
    // FRAME LOOP
    // ========================================================================

    /// Advance one frame and return the events it produced.
    pub fn tick(&mut self, now: Duration) -> Vec<PlaybackEvent> {
        if !self.segments.is_empty() {
            self.output.advance(now);
            self.poll_sources();
            self.step_volume_ramp(now);
            self.step_transition(now);
            self.resolve_pending(now);
            self.check_auto_advance(now);
            self.check_natural_end(now);
            self.apply_gain();
        }
        std::mem::take(&mut self.events)
    }

    fn poll_sources(&mut self) {
        for index in 0..self.sources.len() {
            if !self.sources[index].prepared {
                continue;
            }
            let status = self.output.status(index);
            let previous = std::mem::replace(&mut self.sources[index].status, status.clone());

            match &status {
                SourceStatus::Failed { reason } if !previous.is_failed() => {
                    tracing::warn!("[Playback] Segment {} failed: {}", index, reason);
                    self.events.push(PlaybackEvent::SourceFailed {
                        segment: index,
                        reason: reason.clone(),
                    });
                }
                SourceStatus::Buffering { buffered, .. } => {
                    let fraction = buffered.clamp(0.0, 1.0);
                    let source = &mut self.sources[index];
                    if fraction - source.reported_progress >= 0.01
                        || (fraction >= 1.0 && source.reported_progress < 1.0)
                    {
                        source.reported_progress = fraction;
                        self.events.push(PlaybackEvent::LoadingProgress {
                            segment: index,
                            fraction,
                        });
                    }
                }
                _ => {}
            }
        }

        if self.phase == PlaybackPhase::Loading {
            let status = &self.sources[self.current].status;
            if status.is_ready(self.config.ready_threshold) && self.pending_switch.is_none() {
                self.set_phase(PlaybackPhase::Ready);
            } else if status.is_failed() && self.pending_switch.is_none() {
                match self.next_playable(self.current) {
                    Some(next) => {
                        let previous = self.current;
                        self.current = next;
                        self.prepare_ahead();
                        self.events.push(PlaybackEvent::SegmentChanged {
                            previous: Some(previous),
                            current: next,
                            automatic: true,
                        });
                    }
                    None => self.set_phase(PlaybackPhase::Ended),
                }
            }
        }
    }

    fn step_volume_ramp(&mut self, now: Duration) {
        if let Some(ramp) = self.volume_ramp {
            self.volume = ramp.value_at(now);
            if ramp.is_complete(now) {
                self.volume_ramp = None;
            }
        }
    }

    fn step_transition(&mut self, now: Duration) {
        let Some(transition) = self.transition else {
            return;
        };
        self.fade_gain = transition.ramp.value_at(now);
        if !transition.ramp.is_complete(now) {
            return;
        }
        self.transition = None;

        match transition.then {
            AfterRamp::Hold => {
                self.advance_in_progress = false;
                self.resolve_waiters();
            }
            AfterRamp::PauseOutput => {
                self.output.pause(self.current);
                self.resolve_waiters();
            }
            AfterRamp::Switch(target) => self.perform_switch(target),
            AfterRamp::FinishPlaylist => {
                self.output.pause(self.current);
                self.advance_in_progress = false;
                self.set_phase(PlaybackPhase::Ended);
                self.resolve_waiters();
            }
        }
    }

    fn resolve_pending(&mut self, now: Duration) {
        if let Some(target) = self.pending_switch {
            let status = self.sources[self.current].status.clone();
            if status.is_failed() {
                match self.next_playable(self.current) {
                    Some(next) => {
                        tracing::warn!(
                            "[Playback] Segment {} unavailable, skipping to {}",
                            self.current,
                            next
                        );
                        self.perform_switch(SwitchTarget {
                            index: next,
                            local_time: 0.0,
                            ..target
                        });
                    }
                    None => {
                        self.pending_switch = None;
                        self.advance_in_progress = false;
                        self.set_phase(PlaybackPhase::Ended);
                        self.waiters.clear();
                    }
                }
                return;
            }
            if !status.is_ready(self.config.ready_threshold) {
                return;
            }

            self.pending_switch = None;
            let duration = status.duration().unwrap_or(0.0);
            self.output.seek(self.current, target.local_time.clamp(0.0, duration));
            if self.phase == PlaybackPhase::Loading {
                self.set_phase(PlaybackPhase::Ready);
            }

            if target.resume && self.phase == PlaybackPhase::Playing {
                if let Err(err) = self.output.start(self.current) {
                    log_playback_error(&err, "resume after switch");
                    self.advance_in_progress = false;
                    self.waiters.clear();
                    return;
                }
                self.start_ramp(
                    1.0,
                    self.config.seek_fade_in_ms,
                    Easing::QuadOut,
                    AfterRamp::Hold,
                    now,
                );
            } else {
                self.advance_in_progress = false;
                self.resolve_waiters();
            }
        } else if let Some(position) = self.pending_position {
            let status = &self.sources[self.current].status;
            if status.is_ready(self.config.ready_threshold) {
                let duration = status.duration().unwrap_or(0.0);
                self.output.seek(self.current, position.clamp(0.0, duration));
                self.pending_position = None;
            }
        }
    }

    fn check_auto_advance(&mut self, now: Duration) {
        if self.phase != PlaybackPhase::Playing
            || self.in_transition()
            || self.advance_in_progress
            || self.segments.len() <= 1
            || self.current + 1 >= self.segments.len()
        {
            return;
        }
        let Some(duration) = self.segment_duration(self.current) else {
            return;
        };
        let trigger = duration - self.config.lookahead_ms as f64 / 1000.0;
        if trigger <= 0.0 {
            return;
        }
        if self.output.position(self.current) >= trigger {
            tracing::info!(
                "[Playback] Auto-advance {} -> {} at {:.2}s",
                self.current,
                self.current + 1,
                self.output.position(self.current)
            );
            self.begin_switch(
                SwitchTarget {
                    index: self.current + 1,
                    local_time: 0.0,
                    resume: true,
                    automatic: true,
                },
                self.config.auto_fade_out_ms,
                now,
            );
        }
    }

    fn check_natural_end(&mut self, now: Duration) {
        if self.phase != PlaybackPhase::Playing || self.pending_switch.is_some() {
            return;
        }
        if let Some(transition) = self.transition {
            if transition.ramp.is_fade_out() {
                return;
            }
        }
        let Some(duration) = self.segment_duration(self.current) else {
            return;
        };
        if self.output.position(self.current) < duration || self.ended_reported == Some(self.current) {
            return;
        }

        self.ended_reported = Some(self.current);
        let next = self.next_playable(self.current);
        let is_last = next.is_none();
        self.events.push(PlaybackEvent::SegmentEnded {
            index: self.current,
            next,
            is_last,
        });

        match next {
            Some(index) if !self.advance_in_progress => {
                self.begin_switch(
                    SwitchTarget {
                        index,
                        local_time: 0.0,
                        resume: true,
                        automatic: true,
                    },
                    self.config.seek_fade_out_ms,
                    now,
                );
            }
            Some(_) => {}
            None => {
                tracing::info!("[Playback] Last segment ended");
                self.kill_transition(now);
                self.output.pause(self.current);
                self.set_phase(PlaybackPhase::Ended);
            }
        }
    }

    fn apply_gain(&mut self) {
        let gain = (self.fade_gain * self.volume).clamp(0.0, 1.0);
        self.output.set_gain(self.current, gain);
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn seek_internal(
        &mut self,
        index: usize,
        local_time: f64,
        automatic: bool,
        now: Duration,
    ) -> Result<(), PlaybackError> {
        if self.segments.is_empty() {
            return Err(PlaybackError::NotLoaded);
        }
        if index >= self.segments.len() {
            let err = PlaybackError::InvalidIndex {
                index,
                len: self.segments.len(),
            };
            tracing::warn!("[Playback] Seek rejected: {}", err);
            return Err(err);
        }
        let local_time = local_time.max(0.0);

        if index == self.current && !self.in_transition_to_other_segment() {
            let status = &self.sources[self.current].status;
            if status.is_ready(self.config.ready_threshold) {
                let duration = status.duration().unwrap_or(0.0);
                self.output.seek(self.current, local_time.clamp(0.0, duration));
            } else {
                self.pending_position = Some(local_time);
            }
            if self.ended_reported == Some(self.current) {
                self.ended_reported = None;
            }
            if self.phase == PlaybackPhase::Ended {
                self.set_phase(PlaybackPhase::Paused);
            }
            return Ok(());
        }

        let target = SwitchTarget {
            index,
            local_time,
            resume: self.phase == PlaybackPhase::Playing,
            automatic,
        };

        if self.phase == PlaybackPhase::Playing {
            self.begin_switch(target, self.config.seek_fade_out_ms, now);
        } else {
            self.kill_transition(now);
            self.pending_switch = None;
            if self.phase == PlaybackPhase::Ended {
                self.set_phase(PlaybackPhase::Paused);
            }
            if index == self.current {
                self.pending_position = Some(local_time);
            } else {
                self.advance_in_progress = true;
                self.perform_switch(target);
            }
        }
        Ok(())
    }

    fn begin_switch(&mut self, target: SwitchTarget, fade_ms: u64, now: Duration) {
        self.kill_transition(now);
        self.pending_switch = None;
        self.pending_position = None;
        self.advance_in_progress = true;
        self.start_ramp(0.0, fade_ms, Easing::QuadIn, AfterRamp::Switch(target), now);
    }

    fn perform_switch(&mut self, target: SwitchTarget) {
        let previous = self.current;
        if previous != target.index {
            self.output.pause(previous);
            self.output.set_gain(previous, 0.0);
        }
        self.current = target.index;
        self.fade_gain = 0.0;
        self.pending_position = None;
        self.ended_reported = None;
        self.pending_switch = Some(target);
        self.prepare_ahead();

        tracing::info!(
            "[Playback] Segment {} -> {} ({})",
            previous,
            target.index,
            if target.automatic { "automatic" } else { "requested" }
        );
        if previous != target.index {
            self.events.push(PlaybackEvent::SegmentChanged {
                previous: Some(previous),
                current: target.index,
                automatic: target.automatic,
            });
        }
    }

    fn start_ramp(&mut self, to: f32, duration_ms: u64, easing: Easing, then: AfterRamp, now: Duration) {
        // gain is pinned to the ramp's start value before the new ramp runs
        self.output
            .set_gain(self.current, (self.fade_gain * self.volume).clamp(0.0, 1.0));
        self.transition = Some(Transition {
            ramp: GainRamp::new(
                self.fade_gain,
                to,
                now,
                Duration::from_millis(duration_ms),
                easing,
            ),
            then,
        });
    }

    /// Stop the running ramp where it is; its waiters observe `Superseded`.
    fn kill_transition(&mut self, now: Duration) {
        if let Some(transition) = self.transition.take() {
            self.fade_gain = transition.ramp.value_at(now);
        }
        self.waiters.clear();
    }

    fn in_transition_to_other_segment(&self) -> bool {
        self.pending_switch.is_some()
            || matches!(
                self.transition,
                Some(Transition {
                    then: AfterRamp::Switch(_),
                    ..
                })
            )
    }

    fn next_playable(&self, after: usize) -> Option<usize> {
        (after + 1..self.segments.len()).find(|&i| !self.sources[i].status.is_failed())
    }

    fn prepare_ahead(&mut self) {
        let end = (self.current + self.config.preload_count.max(1)).min(self.segments.len());
        for index in self.current..end {
            if !self.sources[index].prepared {
                self.output.prepare(index, &self.segments[index].source_url);
                self.sources[index].prepared = true;
            }
        }
    }

    fn register_waiter(&mut self) -> FadeCompletion {
        let (tx, completion) = FadeCompletion::pending();
        self.waiters.push(tx);
        completion
    }

    fn resolve_waiters(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn set_phase(&mut self, phase: PlaybackPhase) {
        if self.phase == phase {
            return;
        }
        tracing::info!("[Playback] {:?} -> {:?}", self.phase, phase);
        self.events.push(PlaybackEvent::PhaseChanged {
            from: self.phase,
            to: phase,
        });
        self.phase = phase;
    }
}
