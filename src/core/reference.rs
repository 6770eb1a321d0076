use crate::core::dispersion::{ClassificationMasks, DispersionMaps};
use crate::types::{GeometryLayers, PixelCoord, SarError, SarResult, Stage};
use std::cmp::Ordering;

/// Geometry layer whose non-finite values mark pixels without valid geometry
pub const HEIGHT_LAYER: &str = "height";

/// Chooses the single stable reference pixel of a run
pub struct ReferenceSelector;

impl ReferenceSelector {
    /// Lowest-ADI first-order pixel
    ///
    /// Ties on ADI go to the higher mean amplitude, then to the first pixel in
    /// row-major order.
    pub fn select_reference_pixel(masks: &ClassificationMasks, maps: &DispersionMaps) -> SarResult<PixelCoord> {
        Self::select_among(masks, maps, |_, _| true)
    }

    /// Same ordering as [`Self::select_reference_pixel`], skipping first-order pixels
    /// whose height is not finite
    ///
    /// Stacks without a height layer fall back to the plain selection.
    pub fn select_reference_pixel_with_geometry(
        masks: &ClassificationMasks,
        maps: &DispersionMaps,
        geometry: &GeometryLayers,
    ) -> SarResult<PixelCoord> {
        let height = match geometry.get(HEIGHT_LAYER) {
            Some(height) => height,
            None => return Self::select_reference_pixel(masks, maps),
        };
        if height.dim() != masks.shape() {
            return Err(SarError::Data {
                stage: Stage::Reference,
                message: format!(
                    "height layer shape {:?} does not match mask shape {:?}",
                    height.dim(),
                    masks.shape()
                ),
            });
        }

        let no_data = masks
            .first_order
            .indexed_iter()
            .filter(|&((row, col), &selected)| selected && !height[[row, col]].is_finite())
            .count();
        if no_data > 0 {
            log::debug!("Skipping {} first-order pixels without valid height", no_data);
        }
        Self::select_among(masks, maps, |row, col| height[[row, col]].is_finite())
    }

    fn select_among<F>(masks: &ClassificationMasks, maps: &DispersionMaps, usable: F) -> SarResult<PixelCoord>
    where
        F: Fn(usize, usize) -> bool,
    {
        if masks.shape() != maps.adi.dim() {
            return Err(SarError::Data {
                stage: Stage::Reference,
                message: format!(
                    "mask shape {:?} does not match ADI map shape {:?}",
                    masks.shape(),
                    maps.adi.dim()
                ),
            });
        }

        let mut best: Option<(PixelCoord, f32, f32)> = None;
        for ((row, col), &selected) in masks.first_order.indexed_iter() {
            if !selected || !usable(row, col) {
                continue;
            }
            let adi = maps.adi[[row, col]];
            let amplitude = maps.mean_amplitude[[row, col]];

            let better = match best {
                None => true,
                Some((_, best_adi, best_amp)) => match adi.partial_cmp(&best_adi) {
                    Some(Ordering::Less) => true,
                    Some(Ordering::Equal) => amplitude > best_amp,
                    _ => false,
                },
            };
            if better {
                best = Some((PixelCoord::new(row, col), adi, amplitude));
            }
        }

        match best {
            Some((coord, adi, amplitude)) => {
                log::info!(
                    "Reference pixel {} selected from {} first-order candidates (ADI {:.4}, mean amplitude {:.3})",
                    coord,
                    masks.count_first_order(),
                    adi,
                    amplitude
                );
                Ok(coord)
            }
            None => Err(SarError::EmptySelection {
                stage: Stage::Reference,
                message: "no usable first-order pixel, no reference pixel available".to_string(),
            }),
        }
    }
}
