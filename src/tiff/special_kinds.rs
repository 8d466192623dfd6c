//! Heuristic classification of non-pyramid IFDs in multi-image slide files:
//! thumbnail, label, and macro images sit alongside the pyramid levels of a
//! whole-slide TIFF and need their own detection rules.

use crate::tiff::constants::{compression, tags};
use crate::tiff::ifd::IFD;

/// A non-pyramid-level role an IFD in a multi-image file might play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    /// A small overview image, usually the second IFD, stored untiled.
    Thumbnail,
    /// A small slide label image (near-square).
    Label,
    /// A small whole-slide macro/overview image (elongated).
    Macro,
}

/// Aspect ratio (long side / short side) that flags an image as "elongated"
/// rather than roughly square.
const MACRO_ASPECT_RATIO: f64 = 2.884;
const MACRO_ASPECT_TOLERANCE: f64 = 0.20;

/// An IFD is a thumbnail/label/macro *candidate* only below this pixel area;
/// pyramid levels proper are assumed to exceed it. 2^22.
const SMALL_IMAGE_AREA: u64 = 1 << 22;

/// Classifies the tail of an IFD chain that doesn't belong to the main
/// pyramid: thumbnail, label, and macro images some whole-slide formats
/// append after the resolution levels.
pub struct SpecialKinds;

impl SpecialKinds {
    /// Returns the classification for each IFD in `ifds`, `None` where an
    /// IFD is an ordinary pyramid level rather than one of the special
    /// kinds.
    pub fn classify(ifds: &[IFD]) -> Vec<Option<SpecialKind>> {
        let mut result = vec![None; ifds.len()];
        if ifds.is_empty() {
            return result;
        }

        if let Some(thumb_index) = Self::thumbnail_index(ifds) {
            result[thumb_index] = Some(SpecialKind::Thumbnail);
        }

        if ifds.len() < 2 {
            return result;
        }
        let last = ifds.len() - 1;
        let second_last = ifds.len() - 2;

        let last_small = is_small(&ifds[last]);
        let second_last_small = result[second_last].is_none() && is_small(&ifds[second_last]);

        if last_small && second_last_small {
            let (label, macro_) = Self::disambiguate_pair(&ifds[second_last], &ifds[last]);
            result[second_last] = Some(label);
            result[last] = Some(macro_);
        } else if last_small {
            result[last] = Some(Self::disambiguate_single(&ifds[last]));
        }

        result
    }

    /// Thumbnail candidate: an IFD with no tile offsets (i.e. a plain
    /// stripped overview, not a tiled pyramid level) and an area under
    /// 2^22 pixels. Only IFD #1 is considered.
    fn thumbnail_index(ifds: &[IFD]) -> Option<usize> {
        let candidate = ifds.get(1)?;
        if candidate.has_tag(tags::TILE_OFFSETS) {
            return None;
        }
        if area(candidate)? >= SMALL_IMAGE_AREA {
            return None;
        }
        Some(1)
    }

    /// Both of the last two IFDs are small: the one closer to the macro
    /// aspect ratio is the macro, the other the label. If neither is close
    /// to that ratio, the larger-area one is the macro.
    fn disambiguate_pair(a: &IFD, b: &IFD) -> (SpecialKind, SpecialKind) {
        let a_dist = aspect_distance(a);
        let b_dist = aspect_distance(b);
        let a_matches = a_dist.map(|d| d <= MACRO_ASPECT_TOLERANCE).unwrap_or(false);
        let b_matches = b_dist.map(|d| d <= MACRO_ASPECT_TOLERANCE).unwrap_or(false);

        let a_is_macro = match (a_matches, b_matches) {
            (true, false) => true,
            (false, true) => false,
            _ => area(a).unwrap_or(0) >= area(b).unwrap_or(0),
        };

        if a_is_macro {
            (SpecialKind::Label, SpecialKind::Macro)
        } else {
            (SpecialKind::Macro, SpecialKind::Label)
        }
    }

    /// Only the last IFD is small: classify by aspect ratio, with
    /// JPEG-compressed-ness as a tiebreaker favoring macro when the shape
    /// alone is ambiguous.
    fn disambiguate_single(ifd: &IFD) -> SpecialKind {
        let close_to_macro_ratio = aspect_distance(ifd).map(|d| d <= MACRO_ASPECT_TOLERANCE).unwrap_or(false);
        let is_jpeg = ifd.get_tag_value(tags::COMPRESSION) == Some(compression::JPEG as u64)
            || ifd.get_tag_value(tags::COMPRESSION) == Some(compression::JPEG_OLD as u64);

        if close_to_macro_ratio || is_jpeg {
            SpecialKind::Macro
        } else {
            SpecialKind::Label
        }
    }
}

fn area(ifd: &IFD) -> Option<u64> {
    let (w, h) = ifd.get_dimensions()?;
    Some(w * h)
}

fn is_small(ifd: &IFD) -> bool {
    area(ifd).map(|a| a < SMALL_IMAGE_AREA).unwrap_or(false)
}

/// Relative distance of an IFD's long:short aspect ratio from
/// `MACRO_ASPECT_RATIO`, normalized so that `0.20` corresponds to the
/// spec's "within 20%" window.
fn aspect_distance(ifd: &IFD) -> Option<f64> {
    let (w, h) = ifd.get_dimensions()?;
    if w == 0 || h == 0 {
        return None;
    }
    let (long, short) = if w >= h { (w as f64, h as f64) } else { (h as f64, w as f64) };
    let ratio = long / short;
    Some((ratio - MACRO_ASPECT_RATIO).abs() / MACRO_ASPECT_RATIO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiff::ifd::{IFDEntry, IFDValue};

    fn make_ifd(number: usize, width: u32, height: u32, tiled: bool, compression_code: u16) -> IFD {
        let mut ifd = IFD::new(number, 0);
        ifd.add_entry(IFDEntry::with_value(tags::IMAGE_WIDTH, 0, IFDValue::Long(vec![width])));
        ifd.add_entry(IFDEntry::with_value(tags::IMAGE_LENGTH, 0, IFDValue::Long(vec![height])));
        ifd.add_entry(IFDEntry::with_value(tags::COMPRESSION, 0, IFDValue::Short(vec![compression_code])));
        if tiled {
            ifd.add_entry(IFDEntry::with_value(tags::TILE_OFFSETS, 0, IFDValue::Long(vec![1])));
        }
        ifd
    }

    #[test]
    fn identifies_thumbnail_as_second_ifd_when_small_and_stripped() {
        let ifds = vec![
            make_ifd(0, 50_000, 50_000, true, compression::DEFLATE as u16),
            make_ifd(1, 512, 512, false, compression::DEFLATE as u16),
            make_ifd(2, 1024, 1024, true, compression::DEFLATE as u16),
        ];
        let kinds = SpecialKinds::classify(&ifds);
        assert_eq!(kinds[1], Some(SpecialKind::Thumbnail));
    }

    #[test]
    fn disambiguates_label_and_macro_by_aspect_ratio() {
        // macro: elongated (ratio near 2.884), label: near-square.
        let ifds = vec![
            make_ifd(0, 50_000, 50_000, true, compression::DEFLATE as u16),
            make_ifd(1, 800, 277, false, compression::JPEG as u16),
            make_ifd(2, 400, 400, false, compression::JPEG as u16),
        ];
        let kinds = SpecialKinds::classify(&ifds);
        assert_eq!(kinds[1], Some(SpecialKind::Macro));
        assert_eq!(kinds[2], Some(SpecialKind::Label));
    }

    #[test]
    fn single_small_tail_ifd_uses_jpeg_as_macro_tiebreaker() {
        let ifds = vec![
            make_ifd(0, 50_000, 50_000, true, compression::DEFLATE as u16),
            make_ifd(1, 60_000, 60_000, true, compression::DEFLATE as u16),
            make_ifd(2, 600, 500, false, compression::JPEG as u16),
        ];
        let kinds = SpecialKinds::classify(&ifds);
        assert_eq!(kinds[2], Some(SpecialKind::Macro));
    }

    #[test]
    fn no_classification_when_all_ifds_are_large() {
        let ifds = vec![
            make_ifd(0, 50_000, 50_000, true, compression::DEFLATE as u16),
            make_ifd(1, 25_000, 25_000, true, compression::DEFLATE as u16),
        ];
        let kinds = SpecialKinds::classify(&ifds);
        assert!(kinds.iter().all(|k| k.is_none()));
    }
}
