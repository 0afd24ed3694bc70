use crate::algorithm::Decompressor;
use crate::core::array2d::Array2DRef;
use crate::core::bit_streamer::BitStreamerJpeg;
use crate::core::error::{ErrorContext, ErrorKind, Res, ResultBuilder, WithContext};
use crate::core::parallel::{run_units, DecodeOptions};
use crate::core::prefix_tree::PrefixCodeDecoder;
use crate::core::raw_image::RawImage;

/// Horizontal partition of the frame: `num_slices` column ranges, all
/// `slice_width` wide except the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cr2SliceWidths {
    num_slices: usize,
    slice_width: usize,
    last_slice_width: usize,
}

impl ErrorContext for Cr2SliceWidths {
    fn describe(&self) -> Option<String> {
        Some(format!("{:?}", self))
    }
}

impl Cr2SliceWidths {
    pub fn new(num_slices: u16, slice_width: u16, last_slice_width: u16) -> Res<Self> {
        let slicing = Self {
            num_slices: num_slices.into(),
            slice_width: slice_width.into(),
            last_slice_width: last_slice_width.into(),
        };
        if num_slices < 1 {
            slicing.invalid(format!("Bad slice count: {}", num_slices))?
        }
        Ok(slicing)
    }

    pub fn num_slices(&self) -> usize {
        self.num_slices
    }

    pub fn width_of_slice(&self, slice_id: usize) -> usize {
        debug_assert!(slice_id < self.num_slices);
        if slice_id + 1 == self.num_slices {
            self.last_slice_width
        } else {
            self.slice_width
        }
    }

    pub fn widths(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_slices).map(|id| self.width_of_slice(id))
    }

    pub fn total_width(&self) -> usize {
        self.widths().sum()
    }
}

/// Component count and horizontal/vertical sampling factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cr2Format {
    pub n_comp: usize,
    pub x_s_f: usize,
    pub y_s_f: usize,
}

impl Cr2Format {
    pub const fn new(n_comp: usize, x_s_f: usize, y_s_f: usize) -> Self {
        Self {
            n_comp,
            x_s_f,
            y_s_f,
        }
    }

    /// sRaw1/mRaw, sRaw2/sRaw and the two full raw layouts.
    pub const SUPPORTED: [Cr2Format; 4] = [
        Cr2Format::new(3, 2, 2),
        Cr2Format::new(3, 2, 1),
        Cr2Format::new(2, 1, 1),
        Cr2Format::new(4, 1, 1),
    ];

    pub fn is_subsampled(&self) -> bool {
        self.x_s_f != 1 || self.y_s_f != 1
    }
}

/// Table and starting predictor of one component.
#[derive(Debug, Clone)]
pub struct Cr2Recipe {
    pub decoder: PrefixCodeDecoder,
    pub init_pred: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cr2Step {
    /// A new frame row starts at this output position.
    NewFrameRow { row: usize, col: usize },
    /// One group of `group_size` samples starts at this output position.
    Group { row: usize, col: usize },
}

/// Everything the traversal order depends on, derived once from the headers.
#[derive(Debug, Clone, Copy)]
struct Cr2Geometry {
    format: Cr2Format,
    slicing: Cr2SliceWidths,
    frame_w: usize,
    frame_h: usize,
    real_w: usize,
    real_h: usize,
    cpp: usize,
    group_size: usize,
    pixels_per_group: usize,
    cols_per_group: usize,
    slice_col_step: usize,
}

impl ErrorContext for Cr2Geometry {
    fn describe(&self) -> Option<String> {
        Some(format!(
            "CR2 {:?}, frame {}x{}, {:?}",
            self.format, self.frame_w, self.frame_h, self.slicing
        ))
    }
}

impl Cr2Geometry {
    fn new(
        format: Cr2Format,
        dim: (usize, usize),
        frame: (usize, usize),
        slicing: Cr2SliceWidths,
    ) -> Res<Self> {
        let subsampled = format.is_subsampled();
        let pixels_per_group = format.x_s_f * format.y_s_f;
        let group_size = if subsampled {
            2 + pixels_per_group
        } else {
            format.n_comp
        };
        let cpp = if subsampled { 3 } else { 1 };
        let geo = Self {
            format,
            slicing,
            frame_w: frame.0,
            frame_h: frame.1,
            real_w: dim.0,
            real_h: dim.1,
            cpp,
            group_size,
            pixels_per_group,
            cols_per_group: if subsampled { group_size } else { cpp },
            slice_col_step: format.n_comp * format.x_s_f,
        };
        if subsampled && dim.0 % group_size != 0 {
            geo.invalid(format!(
                "Image width {} is not a multiple of the group size {}",
                dim.0, group_size
            ))?
        }
        let real_w = (if subsampled { dim.0 / group_size } else { dim.0 }) * format.x_s_f;
        let real_h = dim.1 * format.y_s_f;
        let geo = Self {
            real_w,
            real_h,
            ..geo
        };

        // SOF stores both as u16
        let frame_ok = |n: usize| n != 0 && n <= usize::from(u16::MAX);
        if !frame_ok(geo.frame_w) || !frame_ok(geo.frame_h) {
            geo.invalid(format!("Bad frame size: {}x{}", geo.frame_w, geo.frame_h))?
        }
        if geo.frame_w % format.x_s_f != 0 || geo.frame_h % format.y_s_f != 0 {
            geo.invalid("Frame size is not a multiple of the sampling factors".into())?
        }
        for width in [slicing.slice_width, slicing.last_slice_width] {
            if width > real_w {
                geo.invalid(format!("Slice width {} exceeds the image width {}", width, real_w))?
            }
            if width % geo.slice_col_step != 0 {
                geo.invalid(format!(
                    "Slice width ({}) should be multiple of pixel group size ({})",
                    width, geo.slice_col_step
                ))?
            }
            if width % cpp != 0 {
                geo.invalid(format!(
                    "Slice width ({}) should be multiple of image cpp ({})",
                    width, cpp
                ))?
            }
        }
        let covered = geo.frame_h.checked_mul(slicing.total_width());
        let area = real_w.checked_mul(real_h).and_then(|a| a.checked_mul(cpp));
        match (covered, area) {
            (Some(covered), Some(area)) if covered >= area => {}
            _ => geo.invalid("Frame height and slice widths cover less than the image".into())?,
        }
        Ok(geo)
    }

    /// Visits the output in stream order: slices left to right, frame rows
    /// within a slice, then sample groups.
    fn walk<F: FnMut(Cr2Step) -> Res<()>>(&self, mut visit: F) -> Res<()> {
        let x_s_f = self.format.x_s_f;
        let y_s_f = self.format.y_s_f;
        let mut global_frame_col = 0;
        let mut global_frame_row = 0;
        for (slice_id, slice_width) in self.slicing.widths().enumerate() {
            let mut slice_frame_row = 0;
            while slice_frame_row < self.frame_h {
                let row = global_frame_row % self.real_h;
                let col = global_frame_row / self.real_h * self.slicing.width_of_slice(0) / self.cpp;
                if col >= self.real_w {
                    break;
                }
                let pixels_per_slice_row = slice_width / self.cpp;
                if col + pixels_per_slice_row > self.real_w {
                    self.raise(format!(
                        "Slice {} at column {} runs past the image edge",
                        slice_id, col
                    ))?
                }
                if slice_id + 1 == self.slicing.num_slices
                    && col + pixels_per_slice_row != self.real_w
                {
                    self.raise("Insufficient slices, the image is not filled".into())?
                }

                let row = row / y_s_f;
                let mut col = col / x_s_f * self.cols_per_group;
                let mut slice_col = 0;
                while slice_col < slice_width {
                    if global_frame_col == self.frame_w {
                        visit(Cr2Step::NewFrameRow { row, col })?;
                        global_frame_col = 0;
                    }
                    let frame_cols_left =
                        self.slice_col_step * ((self.frame_w - global_frame_col) / x_s_f);
                    let slice_end = slice_col + frame_cols_left.min(slice_width - slice_col);
                    while slice_col < slice_end {
                        visit(Cr2Step::Group { row, col })?;
                        slice_col += self.slice_col_step;
                        global_frame_col += x_s_f;
                        col += self.group_size;
                    }
                }
                slice_frame_row += y_s_f;
                global_frame_row += y_s_f;
            }
        }
        Ok(())
    }

    /// Component of the `p`-th sample of a group.
    fn component(&self, p: usize) -> usize {
        if p < self.pixels_per_group {
            0
        } else {
            p - self.pixels_per_group + 1
        }
    }

    /// Offset within a group of the sample that seeds component `c` on a new frame row.
    fn seed_offset(&self, c: usize) -> usize {
        if c == 0 {
            0
        } else {
            self.group_size - (self.format.n_comp - c)
        }
    }
}

/// Lossless-JPEG style predictive decoder for Canon CR2 slices.
pub struct Cr2Decompressor<'a> {
    img: RawImage<'a>,
    geometry: Cr2Geometry,
    recipes: Vec<Cr2Recipe>,
    input: &'a [u8],
    options: DecodeOptions,
}

impl ErrorContext for Cr2Decompressor<'_> {
    fn describe(&self) -> Option<String> {
        self.geometry.describe()
    }
}

impl<'a> Cr2Decompressor<'a> {
    pub fn new(
        img: RawImage<'a>,
        format: Cr2Format,
        frame: (usize, usize),
        slicing: Cr2SliceWidths,
        recipes: Vec<Cr2Recipe>,
        input: &'a [u8],
    ) -> Res<Self> {
        if img.cpp() != 1 {
            img.invalid(format!("Unexpected cpp: {}", img.cpp()))?
        }
        let dim = img.dim();
        if dim.0 == 0 || dim.1 == 0 || dim.0 > 19440 || dim.1 > 5920 {
            img.invalid(format!("Unexpected image dimensions found: ({}; {})", dim.0, dim.1))?
        }
        for width in slicing.widths() {
            if width == 0 {
                slicing.invalid(format!("Bad slice width: {}", width))?
            }
        }
        if format.is_subsampled() == img.is_cfa() {
            img.invalid("Cannot decode subsampled image to CFA data or vice versa".into())?
        }
        if !Cr2Format::SUPPORTED.contains(&format) {
            img.invalid(format!(
                "Unknown format <{},{},{}>",
                format.n_comp, format.x_s_f, format.y_s_f
            ))?
        }
        if recipes.len() != format.n_comp {
            img.invalid("Initial predictor count does not match component count".into())?
        }
        if let Some(r) = recipes.iter().find(|r| !r.decoder.is_full_decode()) {
            r.decoder.invalid("CR2 tables must decode differences".into())?
        }
        let geometry = Cr2Geometry::new(format, dim, frame, slicing).at(&img)?;
        log::debug!(
            "CR2 {:?}, {}x{} real, frame {:?}",
            format,
            geometry.real_w,
            geometry.real_h,
            frame
        );
        Ok(Self {
            img,
            geometry,
            recipes,
            input,
            options: DecodeOptions::default(),
        })
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }
}

fn decode_slices(
    geo: &Cr2Geometry,
    recipes: &[Cr2Recipe],
    out: &mut Array2DRef<u16>,
    bs: &mut BitStreamerJpeg,
) -> Res<()> {
    let mut pred: Vec<u16> = recipes.iter().map(|r| r.init_pred).collect();
    let mut pred_next = (0, 0);
    geo.walk(|step| {
        match step {
            Cr2Step::NewFrameRow { row, col } => {
                // every component restarts from the first group of the previous frame row
                for (c, p) in pred.iter_mut().enumerate() {
                    let seed = out.get(pred_next.0, pred_next.1 + geo.seed_offset(c));
                    *p = *seed.kind(ErrorKind::OutOfBounds).msg_of(&pred_next)?;
                }
                pred_next = (row, col);
            }
            Cr2Step::Group { row, col } => {
                for p in 0..geo.group_size {
                    let c = geo.component(p);
                    let diff = recipes[c].decoder.decode_difference(bs)?;
                    pred[c] = pred[c].wrapping_add(diff as u16);
                    out.set(row, col + p, pred[c])?;
                }
            }
        }
        Ok(())
    })
}

impl Decompressor for Cr2Decompressor<'_> {
    /// Input bytes consumed by the entropy coded segment.
    type Output = usize;

    fn decompress(&mut self) -> Res<usize> {
        let geo = self.geometry;
        let recipes = &self.recipes;
        let mut bs = BitStreamerJpeg::new(self.input);
        // one shared entropy coded segment, so the slices cannot be split up
        let unit = (&mut self.img.data, &mut bs);
        run_units(vec![unit], &self.options, |_, (out, bs)| {
            Ok(decode_slices(&geo, recipes, out, bs).at(&geo)?)
        })?;
        log::debug!("CR2 consumed {} of {} bytes", bs.stream_position(), self.input.len());
        Ok(bs.stream_position())
    }
}
