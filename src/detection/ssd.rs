//! Anchor/Prior generation for Single Shot MultiBox Detectors (SSDs).
//!
//! SSD networks regress box coordinates relative to a fixed grid of anchors that is determined
//! entirely by the network architecture. The grid must be generated with exactly the parameters
//! the network was trained with, and in exactly the row-major (y, x, intra-cell) order the
//! network's output rows use, because [`crate::detection::decode_boxes`] pairs anchors with
//! regressor rows by index.

use itertools::Itertools;

use crate::iter::zip_exact;
use crate::Error;

/// An anchor of an SSD network.
///
/// All values are normalized grid coordinates in range 0 to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    x_center: f32,
    y_center: f32,
    width: f32,
    height: f32,
}

impl Anchor {
    pub fn new(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            x_center,
            y_center,
            width,
            height,
        }
    }

    #[inline]
    pub fn x_center(&self) -> f32 {
        self.x_center
    }

    #[inline]
    pub fn y_center(&self) -> f32 {
        self.y_center
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }
}

/// Parameters describing the anchor grid of an SSD network.
///
/// A configuration fully determines the anchor set: the same configuration always produces
/// bit-identical anchors.
#[derive(Debug, Clone)]
pub struct AnchorConfig {
    /// Feature map stride of each output layer, in input pixels. Consecutive layers with the same
    /// stride share one feature map and contribute additional anchors per cell.
    pub strides: Vec<u32>,
    pub min_scale: f32,
    pub max_scale: f32,
    pub input_width: u32,
    pub input_height: u32,
    /// Anchor center offset within a feature map cell, as a fraction of the cell size.
    pub anchor_offset_x: f32,
    pub anchor_offset_y: f32,
    pub aspect_ratios: Vec<f32>,
    /// Substitute a fixed 3-ratio anchor set for the first layer.
    pub reduce_boxes_in_lowest_layer: bool,
    /// When positive, appends one extra anchor per layer whose scale is interpolated towards the
    /// next layer's scale.
    pub interpolated_scale_aspect_ratio: f32,
    /// Force all anchor dimensions to 1.0; the box extent is then encoded entirely in the
    /// regressor output.
    pub fixed_anchor_size: bool,
}

/// The precomputed anchor grid of an SSD network.
///
/// Generated once per configuration and shared read-only across all decode calls.
pub struct Anchors {
    anchors: Vec<Anchor>,
}

impl Anchors {
    /// Computes the anchor grid for `config`.
    ///
    /// Returns an error for configurations that cannot produce a usable grid (no output layers,
    /// or no anchors per cell). A misconfiguration here would otherwise surface as a silent
    /// accuracy collapse at decode time.
    pub fn calculate(config: &AnchorConfig) -> Result<Self, Error> {
        if config.strides.is_empty() {
            return Err(Error::AnchorConfig("no output layer strides".into()));
        }
        if config.aspect_ratios.is_empty()
            && config.interpolated_scale_aspect_ratio <= 0.0
            && !config.reduce_boxes_in_lowest_layer
        {
            return Err(Error::AnchorConfig(
                "configuration produces zero anchors per cell".into(),
            ));
        }

        let num_layers = config.strides.len();
        let mut anchors = Vec::new();
        let mut layer_id = 0;
        while layer_id < num_layers {
            // Collect the anchor dimensions of all consecutive layers with identical stride;
            // they share one feature map.
            let mut aspect_ratios = Vec::new();
            let mut scales = Vec::new();
            let mut last_same_stride = layer_id;
            while last_same_stride < num_layers
                && config.strides[last_same_stride] == config.strides[layer_id]
            {
                let scale = interpolated_scale(config, last_same_stride);
                if last_same_stride == 0 && config.reduce_boxes_in_lowest_layer {
                    aspect_ratios.extend([1.0, 2.0, 0.5]);
                    scales.extend([0.1, scale, scale]);
                } else {
                    for &ratio in &config.aspect_ratios {
                        aspect_ratios.push(ratio);
                        scales.push(scale);
                    }
                    if config.interpolated_scale_aspect_ratio > 0.0 {
                        let scale_next = if last_same_stride == num_layers - 1 {
                            1.0
                        } else {
                            interpolated_scale(config, last_same_stride + 1)
                        };
                        scales.push((scale * scale_next).sqrt());
                        aspect_ratios.push(config.interpolated_scale_aspect_ratio);
                    }
                }
                last_same_stride += 1;
            }

            let dims = zip_exact(&aspect_ratios, &scales)
                .map(|(&ratio, &scale)| {
                    let ratio_sqrt = ratio.sqrt();
                    (scale * ratio_sqrt, scale / ratio_sqrt)
                })
                .collect::<Vec<_>>();

            let stride = config.strides[layer_id];
            let feat_w = (config.input_width + stride - 1) / stride;
            let feat_h = (config.input_height + stride - 1) / stride;
            for (y, x) in (0..feat_h).cartesian_product(0..feat_w) {
                let x_center = (x as f32 + config.anchor_offset_x) / feat_w as f32;
                let y_center = (y as f32 + config.anchor_offset_y) / feat_h as f32;
                for &(w, h) in &dims {
                    let (width, height) = if config.fixed_anchor_size {
                        (1.0, 1.0)
                    } else {
                        (w, h)
                    };
                    anchors.push(Anchor {
                        x_center,
                        y_center,
                        width,
                        height,
                    });
                }
            }

            layer_id = last_same_stride;
        }

        Ok(Self { anchors })
    }

    /// Creates an anchor set from explicit anchors (mainly useful in tests).
    pub fn from_anchors(anchors: Vec<Anchor>) -> Self {
        Self { anchors }
    }

    /// Returns the total number of SSD anchors/priors.
    #[inline]
    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Anchor> {
        self.anchors.iter()
    }
}

impl std::ops::Index<usize> for Anchors {
    type Output = Anchor;

    fn index(&self, index: usize) -> &Anchor {
        &self.anchors[index]
    }
}

/// Linearly interpolates the anchor scale of `layer` between the configured min and max scale.
fn interpolated_scale(config: &AnchorConfig, layer: usize) -> f32 {
    let n = config.strides.len();
    if n == 1 {
        (config.min_scale + config.max_scale) * 0.5
    } else {
        config.min_scale
            + (config.max_scale - config.min_scale) * layer as f32 / (n - 1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palm_config() -> AnchorConfig {
        AnchorConfig {
            strides: vec![8, 16, 16, 16],
            min_scale: 0.1484375,
            max_scale: 0.75,
            input_width: 192,
            input_height: 192,
            anchor_offset_x: 0.5,
            anchor_offset_y: 0.5,
            aspect_ratios: vec![1.0],
            reduce_boxes_in_lowest_layer: false,
            interpolated_scale_aspect_ratio: 1.0,
            fixed_anchor_size: true,
        }
    }

    #[test]
    fn palm_grid_has_2016_unit_anchors() {
        let anchors = Anchors::calculate(&palm_config()).unwrap();
        assert_eq!(anchors.anchor_count(), 2016);
        for anchor in anchors.iter() {
            assert_eq!(anchor.width(), 1.0);
            assert_eq!(anchor.height(), 1.0);
        }
    }

    #[test]
    fn palm_grid_layout() {
        let anchors = Anchors::calculate(&palm_config()).unwrap();
        // First stride group: 24×24 cells with 2 anchors each, row-major.
        assert_eq!(anchors[0].x_center(), 0.5 / 24.0);
        assert_eq!(anchors[0].y_center(), 0.5 / 24.0);
        assert_eq!(anchors[1].x_center(), anchors[0].x_center());
        assert_eq!(anchors[2].x_center(), 1.5 / 24.0);
        assert_eq!(anchors[2].y_center(), 0.5 / 24.0);
        // Second stride group starts after 24*24*2 anchors and has 12×12 cells with 6 each.
        let second = 24 * 24 * 2;
        assert_eq!(anchors[second].x_center(), 0.5 / 12.0);
        assert_eq!(anchors[second + 6].x_center(), 1.5 / 12.0);
    }

    #[test]
    fn calculation_is_deterministic() {
        let a = Anchors::calculate(&palm_config()).unwrap();
        let b = Anchors::calculate(&palm_config()).unwrap();
        for (x, y) in zip_exact(a.iter(), b.iter()) {
            assert_eq!(x, y);
        }
    }

    #[test]
    fn variable_anchor_dimensions() {
        let mut config = palm_config();
        config.fixed_anchor_size = false;
        config.strides = vec![8];
        config.aspect_ratios = vec![4.0];
        config.interpolated_scale_aspect_ratio = 0.0;
        let anchors = Anchors::calculate(&config).unwrap();
        let scale = (config.min_scale + config.max_scale) * 0.5;
        assert_eq!(anchors[0].width(), scale * 2.0);
        assert_eq!(anchors[0].height(), scale / 2.0);
    }

    #[test]
    fn empty_strides_fail_loudly() {
        let mut config = palm_config();
        config.strides.clear();
        assert!(Anchors::calculate(&config).is_err());
    }

    #[test]
    fn reduced_first_layer() {
        let mut config = palm_config();
        config.reduce_boxes_in_lowest_layer = true;
        config.strides = vec![8, 16];
        let anchors = Anchors::calculate(&config).unwrap();
        // First layer: 3 fixed ratios, 24×24 cells. Second: 1 ratio + 1 interpolated, 12×12.
        assert_eq!(anchors.anchor_count(), 24 * 24 * 3 + 12 * 12 * 2);
    }
}
