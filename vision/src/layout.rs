//! Resolution-scaled tooltip geometry.
//!
//! All reference offsets are measured on a 1080p capture at UI scale 100%
//! and scaled linearly with the capture height. Named regions let callers
//! bound a template search without hard-coding pixel rectangles.

use crate::image::{Image, Rect};

const BASE_HEIGHT: f32 = 1080.0;

/// Named search regions inside an item description crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelRegion {
    /// Band near the top of the panel where the short separator sits.
    SeparatorTop,
    /// Narrow column on the left edge holding affix/socket bullets,
    /// starting below the given separator y.
    BulletColumn(u32),
    /// Header area above the given separator y (type, rarity, power).
    Header(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct UiLayout {
    scale: f32,
}

impl UiLayout {
    /// Layout for a full-resolution capture of the given height.
    pub fn for_height(height: u32) -> Self {
        Self {
            scale: height as f32 / BASE_HEIGHT,
        }
    }

    pub fn for_frame(frame: Image) -> Self {
        Self::for_height(frame.height())
    }

    #[inline]
    pub fn px(&self, base: u32) -> u32 {
        if base == 0 {
            0
        } else {
            ((base as f32) * self.scale).round().max(1.0) as u32
        }
    }

    /// Height of one text line in the item description.
    pub fn line_height(&self) -> u32 {
        self.px(25)
    }

    /// Resolve a named region against a description-panel crop.
    pub fn region(&self, name: PanelRegion, panel: Image) -> Rect {
        let w = panel.width();
        let h = panel.height();
        match name {
            PanelRegion::SeparatorTop => Rect::new(0, 0, w, self.px(250).min(h)),
            PanelRegion::BulletColumn(sep_y) => {
                let top = sep_y.min(h);
                Rect::new(0, top, self.px(55).min(w), h - top)
            }
            PanelRegion::Header(sep_y) => {
                // The right quarter holds the favorite/junk markers; exclude it
                // so they don't pollute the header OCR.
                Rect::new(0, 0, (w as f32 * 0.74) as u32, sep_y.min(h))
            }
        }
    }
}
