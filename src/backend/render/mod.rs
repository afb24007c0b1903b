// SPDX-License-Identifier: GPL-3.0-only

use crate::{
    backend::rtpvideo::shadow::ShadowSurface,
    utils::geometry::{Rectangle, Size},
};
use std::{cell::Cell, rc::Rc};

pub const CLEAR_COLOR: [u8; 3] = [0x27, 0x29, 0x2a];

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Renderer has no output bound")]
    Unbound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Draws the host's scene into an output's shadow surface.
pub trait SceneRenderer {
    /// Prepares per-output state for an output of `size`.
    fn bind_output(&mut self, size: Size) -> Result<(), RenderError>;
    fn unbind_output(&mut self);
    /// Paints the scene into `target`, touching only pixels inside `damage`.
    fn repaint(&mut self, target: &mut ShadowSurface, damage: Rectangle) -> Result<(), RenderError>;
}

const BARS: [[u8; 3]; 7] = [
    [0xc0, 0xc0, 0xc0],
    [0xc0, 0xc0, 0x00],
    [0x00, 0xc0, 0xc0],
    [0x00, 0xc0, 0x00],
    [0xc0, 0x00, 0xc0],
    [0xc0, 0x00, 0x00],
    [0x00, 0x00, 0xc0],
];
const BLOCK_STEP: i64 = 4;

/// Color bars with a white block sliding across, used when no compositor scene is
/// available.
#[derive(Debug, Clone)]
pub struct TestPattern {
    frame: Rc<Cell<u64>>,
    bound: Option<Size>,
}

impl TestPattern {
    /// The block is drawn at the position for the frame number in `frame`.
    pub fn new(frame: Rc<Cell<u64>>) -> Self {
        TestPattern { frame, bound: None }
    }

    /// Area covered by the block in `frame` on an output of `size`.
    pub fn block(frame: u64, size: Size) -> Rectangle {
        let side = (size.h / 6).max(1);
        let travel = i64::from((size.w - side).max(1));
        let x = ((frame as i64 * BLOCK_STEP) % travel) as i32;
        let y = (size.h - side) / 2;
        Rectangle::new(x, y, x + side, y + side)
    }

    fn bar(size: Size, i: usize) -> Rectangle {
        let n = BARS.len() as i32;
        let x1 = size.w * i as i32 / n;
        let x2 = size.w * (i as i32 + 1) / n;
        Rectangle::new(x1, 0, x2, size.h * 2 / 3)
    }
}

impl SceneRenderer for TestPattern {
    fn bind_output(&mut self, size: Size) -> Result<(), RenderError> {
        self.bound = Some(size);
        Ok(())
    }

    fn unbind_output(&mut self) {
        self.bound = None;
    }

    fn repaint(&mut self, target: &mut ShadowSurface, damage: Rectangle) -> Result<(), RenderError> {
        let size = self.bound.ok_or(RenderError::Unbound)?;
        let damage = damage.clamp_to(size.min(target.size()));
        if damage.is_empty() {
            return Ok(());
        }

        target.fill(damage, CLEAR_COLOR);
        for (i, color) in BARS.iter().enumerate() {
            if let Some(area) = Self::bar(size, i).intersection(&damage) {
                target.fill(area, *color);
            }
        }
        if let Some(area) = Self::block(self.frame.get(), size).intersection(&damage) {
            target.fill(area, [0xff, 0xff, 0xff]);
        }
        Ok(())
    }
}
