//! Port for the display surface behind a slot.

use crate::domain::entities::LoadedImage;

/// Something that can show an image or a placeholder, such as a list row.
///
/// The fetch coordinator only keeps weak references to targets and calls them
/// while holding its slot registry lock, so implementations must not call
/// back into the coordinator.
pub trait SlotTarget: Send + Sync {
    /// Shows a loaded image.
    fn show_image(&self, image: &LoadedImage);

    /// Shows the empty/placeholder representation.
    fn show_placeholder(&self);
}
