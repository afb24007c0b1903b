// SPDX-License-Identifier: GPL-3.0-only

use crate::utils::geometry::{Rectangle, Size};
use bitflags::bitflags;
use std::{collections::TryReserveError, time::Duration};

pub mod render;
pub mod rtpvideo;

use self::{render::RenderError, rtpvideo::shadow::SurfaceError};

/// A display mode, `refresh` in mHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode {
    pub size: Size,
    pub refresh: i32,
}

bitflags! {
    /// Presentation feedback flags as defined by `wp_presentation_feedback`, plus
    /// `INVALID` for frames the backend cannot say anything about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FeedbackFlags: u32 {
        const VSYNC = 0x1;
        const HW_CLOCK = 0x2;
        const HW_COMPLETION = 0x4;
        const ZERO_COPY = 0x8;
        const INVALID = 0x8000_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        /// Outputs accept any requested size.
        const ARBITRARY_MODES = 0x1;
    }
}

/// Events an output reports back to the host, delivered through a calloop channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    FrameFinished {
        output: String,
        presented: Duration,
        feedback: FeedbackFlags,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Output size can only be set once")]
    SizeAlreadySet,
    #[error("Invalid output size {0}")]
    InvalidSize(Size),
    #[error("Output has no mode set")]
    NoMode,
    #[error("Output {active} is already enabled, only a single output is supported")]
    AlreadyEnabled { active: String },
    #[error("Output is not enabled")]
    NotEnabled,
    #[error("Failed to allocate mode")]
    ModeAlloc(#[from] TryReserveError),
    #[error("Failed to schedule timer")]
    Timer(#[source] calloop::Error),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Operations the host drives an output through.
pub trait Output {
    fn name(&self) -> &str;
    fn current_mode(&self) -> Option<Mode>;
    fn modes(&self) -> Vec<Mode>;
    fn is_enabled(&self) -> bool;

    /// Sets the initial size. Only valid once, before the output is first enabled.
    fn set_size(&mut self, size: Size) -> Result<(), OutputError>;
    fn enable(&mut self) -> Result<(), OutputError>;
    fn disable(&mut self) -> Result<(), OutputError>;
    fn switch_mode(&mut self, mode: Mode) -> Result<(), OutputError>;
    /// Reports a finished frame right away so the host can start its repaint cycle.
    fn start_repaint_loop(&mut self);
    fn repaint(&mut self, damage: Rectangle) -> Result<(), OutputError>;
    fn destroy(self: Box<Self>);
}
