// SPDX-License-Identifier: GPL-3.0-only

use crate::{backend::Mode, utils::geometry::Size};
use bitflags::bitflags;
use std::collections::TryReserveError;

/// Refresh rate (mHz) of every mode this backend creates.
pub const DEFAULT_REFRESH: i32 = 60_000;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeFlags: u32 {
        const CURRENT = 0x1;
        const PREFERRED = 0x2;
    }
}

/// Stable handle to an entry of a [`ModeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputMode {
    pub mode: Mode,
    pub flags: ModeFlags,
}

/// Append-only list of the modes an output advertises.
#[derive(Debug, Default)]
pub struct ModeTable {
    modes: Vec<OutputMode>,
    current: Option<ModeId>,
}

impl ModeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the mode with the requested size, or adds one at [`DEFAULT_REFRESH`].
    ///
    /// Only the size is compared; the refresh rate of `mode` is not part of the key.
    pub fn resolve(&mut self, mode: Mode) -> Result<ModeId, TryReserveError> {
        if let Some(id) = self.find(mode.size) {
            return Ok(id);
        }
        self.modes.try_reserve(1)?;
        self.modes.push(OutputMode {
            mode: Mode {
                size: mode.size,
                refresh: DEFAULT_REFRESH,
            },
            flags: ModeFlags::empty(),
        });
        Ok(ModeId(self.modes.len() - 1))
    }

    pub fn find(&self, size: Size) -> Option<ModeId> {
        self.modes
            .iter()
            .position(|entry| entry.mode.size == size)
            .map(ModeId)
    }

    pub fn get(&self, id: ModeId) -> Option<&OutputMode> {
        self.modes.get(id.0)
    }

    pub fn current_id(&self) -> Option<ModeId> {
        self.current
    }

    pub fn current(&self) -> Option<Mode> {
        self.current.and_then(|id| self.get(id)).map(|entry| entry.mode)
    }

    /// Moves the `CURRENT` flag to `id`.
    pub fn set_current(&mut self, id: ModeId) {
        if let Some(old) = self.current.take() {
            self.modes[old.0].flags.remove(ModeFlags::CURRENT);
        }
        self.modes[id.0].flags.insert(ModeFlags::CURRENT);
        self.current = Some(id);
    }

    pub fn set_preferred(&mut self, id: ModeId) {
        for entry in self.modes.iter_mut() {
            entry.flags.remove(ModeFlags::PREFERRED);
        }
        self.modes[id.0].flags.insert(ModeFlags::PREFERRED);
    }

    /// Modes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &OutputMode> {
        self.modes.iter()
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mode(w: i32, h: i32, refresh: i32) -> Mode {
        Mode {
            size: (w, h).into(),
            refresh,
        }
    }

    #[test]
    fn resolve_matches_on_size_only() {
        let mut table = ModeTable::new();
        let a = table.resolve(mode(640, 480, 30_000)).unwrap();
        let b = table.resolve(mode(640, 480, 75_000)).unwrap();
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(a).unwrap().mode.refresh, DEFAULT_REFRESH);

        let c = table.resolve(mode(1920, 1080, 60_000)).unwrap();
        assert_ne!(a, c);
        let sizes = table.iter().map(|m| m.mode.size).collect::<Vec<_>>();
        assert_eq!(sizes, vec![Size::new(640, 480), Size::new(1920, 1080)]);
    }

    #[test]
    fn single_current_flag() {
        let mut table = ModeTable::new();
        let a = table.resolve(mode(640, 480, 0)).unwrap();
        let b = table.resolve(mode(800, 600, 0)).unwrap();
        table.set_current(a);
        table.set_preferred(a);
        table.set_current(b);

        let current = table
            .iter()
            .filter(|m| m.flags.contains(ModeFlags::CURRENT))
            .count();
        assert_eq!(current, 1);
        assert_eq!(table.current(), Some(mode(800, 600, DEFAULT_REFRESH)));
        assert_eq!(table.get(a).unwrap().flags, ModeFlags::PREFERRED);
        assert_eq!(
            table.get(b).unwrap().flags,
            ModeFlags::CURRENT
        );
    }
}
