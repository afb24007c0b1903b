// SPDX-License-Identifier: GPL-3.0-only

use super::Stream;
use crate::{
    backend::{FeedbackFlags, OutputError, OutputEvent},
    utils::{clock::PresentationClock, geometry::Rectangle},
};
use calloop::{
    channel::Sender,
    timer::{TimeoutAction, Timer},
    LoopHandle, RegistrationToken,
};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};
use tracing::{trace, warn};

pub const REDRAW_INTERVAL: Duration = Duration::from_millis(1000);
pub const FINISH_FRAME_DELAY: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Period of the full-surface redraw that keeps the stream alive on a static scene.
    pub redraw_interval: Duration,
    /// Latency between a repaint and the finished frame reported to the host.
    pub finish_frame_delay: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        PacingConfig {
            redraw_interval: REDRAW_INTERVAL,
            finish_frame_delay: FINISH_FRAME_DELAY,
        }
    }
}

/// Owns the redraw and finish-frame timers of one output.
///
/// Both timers live in the host's event loop and are removed from it on
/// [`disarm`](Self::disarm) or drop, so no callback runs for a disabled output.
pub struct FramePacer<D: 'static> {
    loop_handle: LoopHandle<'static, D>,
    config: PacingConfig,
    redraw: Option<RegistrationToken>,
    finish_frame: Rc<Cell<Option<RegistrationToken>>>,
}

impl<D> std::fmt::Debug for FramePacer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePacer")
            .field("config", &self.config)
            .field("redraw", &self.redraw)
            .field("finish_frame", &self.finish_frame.get())
            .finish()
    }
}

impl<D: 'static> FramePacer<D> {
    pub fn new(loop_handle: LoopHandle<'static, D>, config: PacingConfig) -> Self {
        FramePacer {
            loop_handle,
            config,
            redraw: None,
            finish_frame: Rc::new(Cell::new(None)),
        }
    }

    pub fn config(&self) -> PacingConfig {
        self.config
    }

    /// Takes effect the next time the timers are armed.
    pub fn set_config(&mut self, config: PacingConfig) {
        self.config = config;
    }

    pub fn redraw_armed(&self) -> bool {
        self.redraw.is_some()
    }

    pub fn finish_frame_pending(&self) -> bool {
        self.finish_frame.get().is_some()
    }

    /// Starts the periodic full-surface redraw of `stream`.
    pub(super) fn arm_redraw(&mut self, stream: Rc<RefCell<Stream>>) -> Result<(), OutputError> {
        if let Some(token) = self.redraw.take() {
            self.loop_handle.remove(token);
        }

        let interval = self.config.redraw_interval;
        let token = self
            .loop_handle
            .insert_source(Timer::from_duration(interval), move |_, _, _| {
                let mut stream = stream.borrow_mut();
                if let Some(size) = stream.surface_size() {
                    trace!("Periodic redraw");
                    stream.encode(Rectangle::from_size(size));
                }
                TimeoutAction::ToDuration(interval)
            })
            .map_err(|err| OutputError::Timer(err.error))?;
        self.redraw = Some(token);
        Ok(())
    }

    /// (Re)starts the finish-frame timer, replacing one that has not fired yet.
    pub fn schedule_finish_frame(
        &mut self,
        output: &str,
        clock: Rc<dyn PresentationClock>,
        events: Sender<OutputEvent>,
    ) -> Result<(), OutputError> {
        if let Some(token) = self.finish_frame.take() {
            self.loop_handle.remove(token);
        }

        let pending = self.finish_frame.clone();
        let output = output.to_string();
        let token = self
            .loop_handle
            .insert_source(
                Timer::from_duration(self.config.finish_frame_delay),
                move |_, _, _| {
                    pending.set(None);
                    let event = OutputEvent::FrameFinished {
                        output: output.clone(),
                        presented: clock.now(),
                        feedback: FeedbackFlags::INVALID,
                    };
                    if events.send(event).is_err() {
                        warn!(?output, "Host is no longer listening for output events");
                    }
                    TimeoutAction::Drop
                },
            )
            .map_err(|err| OutputError::Timer(err.error))?;
        self.finish_frame.set(Some(token));
        Ok(())
    }

    pub fn disarm(&mut self) {
        if let Some(token) = self.redraw.take() {
            self.loop_handle.remove(token);
        }
        if let Some(token) = self.finish_frame.take() {
            self.loop_handle.remove(token);
        }
    }
}

impl<D: 'static> Drop for FramePacer<D> {
    fn drop(&mut self) {
        self.disarm();
    }
}
