//! Deep Zoom Image (DZI) naming and descriptors.
//!
//! Deep Zoom viewers such as OpenSeadragon derive every URL from the
//! descriptor URL:
//!
//! ```text
//! /viewer/42.dzi                    descriptor
//! /viewer/42_files/{level}/{c}_{r}.jpg   tiles
//! ```
//!
//! Level numbering and dimensions live in [`crate::tile::geometry`]; this
//! module only deals with names and XML.

use crate::store::SlideId;

/// Generate the DZI XML descriptor for a slide.
///
/// # Example Output
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Image xmlns="http://schemas.microsoft.com/deepzoom/2008"
///        TileSize="512"
///        Overlap="0"
///        Format="jpg">
///   <Size Width="46920" Height="33600" />
/// </Image>
/// ```
pub fn generate_dzi_xml(width: u32, height: u32, tile_size: u32, format: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Image xmlns="http://schemas.microsoft.com/deepzoom/2008"
       TileSize="{tile_size}"
       Overlap="0"
       Format="{format}">
  <Size Width="{width}" Height="{height}" />
</Image>"#
    )
}

/// Parse the slide id from a descriptor name like `42.dzi`.
pub fn parse_descriptor_name(name: &str) -> Option<SlideId> {
    name.strip_suffix(".dzi")?.parse().ok()
}

/// Parse the slide id from a tile directory name like `42_files`.
pub fn parse_files_dir(name: &str) -> Option<SlideId> {
    name.strip_suffix("_files")?.parse().ok()
}

/// Parse tile coordinates from a filename like `3_5.jpg`.
///
/// The extension must match `extension`. Returns `(col, row)`.
pub fn parse_tile_coords(filename: &str, extension: &str) -> Option<(u32, u32)> {
    let name = filename.strip_suffix(extension)?.strip_suffix('.')?;

    let (col, row) = name.split_once('_')?;
    Some((col.parse().ok()?, row.parse().ok()?))
}
