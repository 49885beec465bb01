//! Map interface consumed by the filter.
//!
//! The filter never owns a map; it only needs to draw poses uniformly
//! over the map's extent and ask whether a world position lies inside the
//! map or on known free space. Anything that can answer those three
//! questions (a log-odds grid, a vector map with a rasterized overlay, a
//! mock) can localize against this filter.

/// Read-only occupancy queries over a world-frame map.
///
/// The map frame is centered on the world origin: uniform draws cover
/// `[-world_width/2, world_width/2] x [-world_height/2, world_height/2]`.
///
/// Implementations are read-only from the filter's point of view and may
/// be shared across filter instances; the caller is responsible for not
/// rewriting the map concurrently with a filter call.
pub trait OccupancyMap {
    /// Width of the mapped region in world meters.
    fn world_width(&self) -> f32;

    /// Height of the mapped region in world meters.
    fn world_height(&self) -> f32;

    /// True if (x, y) falls inside the map bounds.
    fn contains(&self, x: f32, y: f32) -> bool;

    /// True if the cell containing (x, y) is known free space.
    ///
    /// Unknown and occupied cells both report false; samples are only
    /// ever injected into cells the map has positively observed as free.
    fn is_free(&self, x: f32, y: f32) -> bool;
}

impl<M: OccupancyMap + ?Sized> OccupancyMap for &M {
    fn world_width(&self) -> f32 {
        (**self).world_width()
    }

    fn world_height(&self) -> f32 {
        (**self).world_height()
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        (**self).contains(x, y)
    }

    fn is_free(&self, x: f32, y: f32) -> bool {
        (**self).is_free(x, y)
    }
}
