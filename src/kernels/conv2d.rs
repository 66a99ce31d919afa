use crate::error::KernelError;
use crate::kernels::dsp::{Dsp, Native};
use crate::kernels::gemm::{mat_mult_kernel_reordered, mat_mult_tail, OutputCursor};
use crate::kernels::im2col::{PatchSource, RegionPlan};
use crate::kernels::quantization::{Icn, PactCh, Requantize, Thresholds};
use crate::kernels::utils::lcm;
use crate::tensor::{Packed, PackedMut, Packing, WeightOffsets, U2, U4, U8};
use core::marker::PhantomData;
use log::{debug, trace, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Padding {
    pub left: usize,
    pub right: usize,
    pub top: usize,
    pub bottom: usize,
}

impl Padding {
    pub fn uniform(p: usize) -> Self {
        Self {
            left: p,
            right: p,
            top: p,
            bottom: p,
        }
    }
}

/// Shape of a square HWC convolution.
///
/// Input and output are square. The builders derive `dim_im_out` from the
/// horizontal padding (`left + right`); `top` only shifts the receptive field
/// vertically and `bottom` is not read.
///
/// `dim_im_out` is taken as given; [`ConvGeometry::expected_dim_im_out`]
/// computes the value the other fields imply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub dim_im_in: usize,
    pub ch_im_in: usize,
    pub ch_im_out: usize,
    pub dim_kernel: usize,
    pub padding: Padding,
    pub stride: usize,
    pub dim_im_out: usize,
}

impl ConvGeometry {
    /// Unpadded, stride-1 geometry with `dim_im_out` derived from the rest.
    pub fn new(dim_im_in: usize, ch_im_in: usize, ch_im_out: usize, dim_kernel: usize) -> Self {
        let mut g = Self {
            dim_im_in,
            ch_im_in,
            ch_im_out,
            dim_kernel,
            padding: Padding::default(),
            stride: 1,
            dim_im_out: 0,
        };
        g.dim_im_out = g.expected_dim_im_out();
        g
    }

    /// Sets the padding and re-derives `dim_im_out`.
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self.dim_im_out = self.expected_dim_im_out();
        self
    }

    /// Sets the stride and re-derives `dim_im_out`.
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self.dim_im_out = self.expected_dim_im_out();
        self
    }

    pub fn expected_dim_im_out(&self) -> usize {
        let padded = self.dim_im_in + self.padding.left + self.padding.right;
        if padded < self.dim_kernel || self.stride == 0 {
            return 0;
        }
        (padded - self.dim_kernel) / self.stride + 1
    }

    /// Length of one unrolled patch (`ch_im_in * dim_kernel^2`).
    pub fn num_col(&self) -> usize {
        self.ch_im_in * self.dim_kernel * self.dim_kernel
    }

    /// Scratch buffer elements needed: two stacked patches.
    pub fn buffer_a_len(&self) -> usize {
        2 * self.num_col()
    }

    pub fn input_len(&self) -> usize {
        self.dim_im_in * self.dim_im_in * self.ch_im_in
    }

    pub fn output_len(&self) -> usize {
        self.dim_im_out * self.dim_im_out * self.ch_im_out
    }
}

/// Divisibility the channel counts must satisfy.
///
/// Input channels come in groups of four so reorder groups and packed pixels
/// start on byte boundaries; output channels are processed in pairs and
/// pixels must end on an output byte boundary. Constraints only start from
/// [`ChannelConstraint::for_output`] and can only be tightened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConstraint {
    in_factor: usize,
    out_factor: usize,
}

impl ChannelConstraint {
    pub fn for_output<O: Packing>() -> Self {
        Self {
            in_factor: 4,
            out_factor: lcm(2, O::PER_BYTE),
        }
    }

    /// Tightens both factors to multiples of the given ones. Zero factors
    /// leave the current one unchanged.
    pub fn at_least(self, in_factor: usize, out_factor: usize) -> Self {
        Self {
            in_factor: lcm(self.in_factor, in_factor.max(1)),
            out_factor: lcm(self.out_factor, out_factor.max(1)),
        }
    }

    pub fn in_factor(&self) -> usize {
        self.in_factor
    }

    pub fn out_factor(&self) -> usize {
        self.out_factor
    }

    pub fn check(&self, ch_im_in: usize, ch_im_out: usize) -> Result<(), KernelError> {
        if ch_im_in % self.in_factor != 0 || ch_im_out % self.out_factor != 0 {
            return Err(KernelError::SizeMismatch {
                ch_im_in,
                ch_im_out,
                in_factor: self.in_factor,
                out_factor: self.out_factor,
            });
        }
        Ok(())
    }
}

/// Scratch-buffer state between im2col and the kernels.
///
/// Patches are written into alternating halves of the buffer; once both
/// halves hold a patch they are dispatched to the blocked kernel and the fill
/// position resets. A single leftover patch at the end goes through the
/// scalar tail.
struct PatchPipeline<'b, 'o, 'w, W: Packing, O: Packing, Q, D> {
    buffer: &'b mut [i16],
    num_col: usize,
    pending: usize,
    weights: Packed<'w, W>,
    ch_im_out: usize,
    bias: &'w [i32],
    z_wt: WeightOffsets<'w>,
    requant: &'w Q,
    out: OutputCursor<'o, O>,
    dispatches: usize,
    _dsp: PhantomData<D>,
}

impl<W, O, Q, D> PatchPipeline<'_, '_, '_, W, O, Q, D>
where
    W: Packing,
    O: Packing,
    Q: Requantize,
    D: Dsp,
{
    /// Slot for the next patch.
    #[inline(always)]
    fn slot(&mut self) -> &mut [i16] {
        let start = self.pending * self.num_col;
        &mut self.buffer[start..start + self.num_col]
    }

    /// Marks the slot as filled, dispatching when both patches are present.
    #[inline(always)]
    fn commit(&mut self) {
        self.pending += 1;
        if self.pending == 2 {
            mat_mult_kernel_reordered::<W, O, Q, D>(
                self.weights,
                self.buffer,
                self.ch_im_out,
                self.num_col,
                self.bias,
                self.z_wt,
                self.requant,
                &mut self.out,
            );
            self.pending = 0;
            self.dispatches += 1;
        }
    }

    /// Drains a half-filled buffer and returns the number of pixels written.
    fn finish(mut self) -> usize {
        if self.pending == 1 {
            mat_mult_tail::<W, O, Q, D>(
                self.weights,
                &self.buffer[..self.num_col],
                self.ch_im_out,
                self.num_col,
                self.bias,
                self.z_wt,
                self.requant,
                &mut self.out,
            );
            self.pending = 0;
        }
        trace!("conv: {} blocked dispatches, {} pixels", self.dispatches, self.out.pixel());
        self.out.pixel()
    }
}

/// Validates every precondition up front so a failing call writes nothing.
#[allow(clippy::too_many_arguments)]
fn validate<I: Packing, W: Packing, O: Packing, Q: Requantize>(
    constraint: ChannelConstraint,
    input: &Packed<'_, I>,
    geometry: &ConvGeometry,
    weights: &Packed<'_, W>,
    bias: &[i32],
    z_wt: &WeightOffsets<'_>,
    requant: &Q,
    output: &PackedMut<'_, O>,
    buffer_a: &[i16],
) -> Result<(), KernelError> {
    let g = geometry;
    constraint.check(g.ch_im_in, g.ch_im_out)?;
    KernelError::check_len("input", g.input_len(), input.len_elements())?;
    KernelError::check_len("weights", g.ch_im_out * g.num_col(), weights.len_elements())?;
    KernelError::check_len("bias", g.ch_im_out, bias.len())?;
    KernelError::check_len("output", g.output_len(), output.len_elements())?;
    KernelError::check_len("bufferA", g.buffer_a_len(), buffer_a.len())?;
    z_wt.check(g.ch_im_out)?;
    requant.check::<O>(g.ch_im_out)
}

/// HWC convolution with packed `I`-bit input, `W`-bit weights and `O`-bit
/// output, on the build target's native ALU.
///
/// `weights` is `[ch_im_out][dim_kernel][dim_kernel][ch_im_in]`, packed.
/// `buffer_a` must hold [`ConvGeometry::buffer_a_len`] values.
#[allow(clippy::too_many_arguments)]
pub fn conv_hwc<I, W, O, Q>(
    input: Packed<'_, I>,
    geometry: &ConvGeometry,
    weights: Packed<'_, W>,
    bias: &[i32],
    z_in: u8,
    z_wt: WeightOffsets<'_>,
    requant: &Q,
    output: PackedMut<'_, O>,
    buffer_a: &mut [i16],
) -> Result<(), KernelError>
where
    I: Packing,
    W: Packing,
    O: Packing,
    Q: Requantize,
{
    conv_hwc_with::<I, W, O, Q, Native>(
        ChannelConstraint::for_output::<O>(),
        input,
        geometry,
        weights,
        bias,
        z_in,
        z_wt,
        requant,
        output,
        buffer_a,
    )
}

/// [`conv_hwc`] with an explicit channel constraint and ALU. The constraint
/// is merged with the one the output width requires, so it can only add
/// divisibility requirements.
#[allow(clippy::too_many_arguments)]
pub fn conv_hwc_with<I, W, O, Q, D>(
    constraint: ChannelConstraint,
    input: Packed<'_, I>,
    geometry: &ConvGeometry,
    weights: Packed<'_, W>,
    bias: &[i32],
    z_in: u8,
    z_wt: WeightOffsets<'_>,
    requant: &Q,
    output: PackedMut<'_, O>,
    buffer_a: &mut [i16],
) -> Result<(), KernelError>
where
    I: Packing,
    W: Packing,
    O: Packing,
    Q: Requantize,
    D: Dsp,
{
    let constraint = ChannelConstraint::for_output::<O>().at_least(constraint.in_factor, constraint.out_factor);
    if let Err(e) = validate(
        constraint, &input, geometry, &weights, bias, &z_wt, requant, &output, buffer_a,
    ) {
        warn!("conv_hwc rejected {:?}: {}", geometry, e);
        return Err(e);
    }

    let g = geometry;
    let plan = RegionPlan::new(
        g.dim_im_in,
        g.dim_kernel,
        g.stride,
        g.padding.top,
        g.padding.left,
        g.dim_im_out,
    );
    debug!(
        "conv_hwc u{}->u{} (wt u{}): {}x{}x{} -> {}x{}x{}, k={} s={} pad={:?}, interior rows {:?} cols {:?}",
        I::BITS,
        O::BITS,
        W::BITS,
        g.dim_im_in,
        g.dim_im_in,
        g.ch_im_in,
        g.dim_im_out,
        g.dim_im_out,
        g.ch_im_out,
        g.dim_kernel,
        g.stride,
        g.padding,
        plan.rows,
        plan.cols
    );

    let src = PatchSource {
        input,
        dim_im_in: g.dim_im_in,
        ch_im_in: g.ch_im_in,
        dim_kernel: g.dim_kernel,
        stride: g.stride,
        left_pad: g.padding.left,
        top_pad: g.padding.top,
        z_in,
    };

    let mut pipeline = PatchPipeline::<W, O, Q, D> {
        buffer: buffer_a,
        num_col: g.num_col(),
        pending: 0,
        weights,
        ch_im_out: g.ch_im_out,
        bias,
        z_wt,
        requant,
        out: OutputCursor::new(output, g.ch_im_out),
        dispatches: 0,
        _dsp: PhantomData,
    };

    for oy in 0..g.dim_im_out {
        for (region, cols) in plan.row_spans(oy) {
            let fill = region.fill::<I>();
            for ox in cols {
                fill(&src, oy, ox, pipeline.slot());
                pipeline.commit();
            }
        }
    }

    let written = pipeline.finish();
    debug_assert_eq!(written, g.dim_im_out * g.dim_im_out);
    Ok(())
}

/// u2 input, u8 weights, u2 output, ICN folding with a shared weight
/// zero-point. Both channel counts must be multiples of 16.
#[allow(clippy::too_many_arguments)]
pub fn conv_hwc_u2_u2_u8_icn(
    input: Packed<'_, U2>,
    geometry: &ConvGeometry,
    weights: Packed<'_, U8>,
    bias: &[i32],
    output: PackedMut<'_, U2>,
    z_in: u8,
    z_wt: u8,
    z_out: u8,
    m_zero: &[i32],
    n_zero: &[i8],
    buffer_a: &mut [i16],
) -> Result<(), KernelError> {
    conv_hwc_with::<U2, U8, U2, _, Native>(
        ChannelConstraint::for_output::<U2>().at_least(16, 16),
        input,
        geometry,
        weights,
        bias,
        z_in,
        WeightOffsets::Scalar(z_wt),
        &Icn { z_out, m_zero, n_zero },
        output,
        buffer_a,
    )
}

/// u8 input, u2 weights with per-channel zero-points, u8 output by PACT
/// saturation. Both channel counts must be multiples of 4.
#[allow(clippy::too_many_arguments)]
pub fn conv_hwc_u8_u8_u2_pact_ch(
    input: Packed<'_, U8>,
    geometry: &ConvGeometry,
    weights: Packed<'_, U2>,
    bias: &[i32],
    output: PackedMut<'_, U8>,
    z_in: u8,
    z_wt: &[u8],
    buffer_a: &mut [i16],
) -> Result<(), KernelError> {
    conv_hwc_with::<U8, U2, U8, _, Native>(
        ChannelConstraint::for_output::<U8>().at_least(4, 4),
        input,
        geometry,
        weights,
        bias,
        z_in,
        WeightOffsets::PerChannel(z_wt),
        &PactCh,
        output,
        buffer_a,
    )
}

/// u4 input, u2 weights with per-channel zero-points, u4 output folded by
/// per-channel threshold ladders (16 entries per channel). Both channel
/// counts must be multiples of 4.
#[allow(clippy::too_many_arguments)]
pub fn conv_hwc_u4_u4_u2_pact_ch_thr(
    input: Packed<'_, U4>,
    geometry: &ConvGeometry,
    weights: Packed<'_, U2>,
    bias: &[i32],
    output: PackedMut<'_, U4>,
    z_in: u8,
    z_wt: &[u8],
    thresholds: &[i16],
    buffer_a: &mut [i16],
) -> Result<(), KernelError> {
    conv_hwc_with::<U4, U2, U4, _, Native>(
        ChannelConstraint::for_output::<U4>().at_least(4, 4),
        input,
        geometry,
        weights,
        bias,
        z_in,
        WeightOffsets::PerChannel(z_wt),
        &Thresholds { ladder: thresholds },
        output,
        buffer_a,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::dsp::Scalar;

    #[test]
    fn test_expected_dim_im_out() {
        assert_eq!(ConvGeometry::new(5, 4, 4, 3).dim_im_out, 3);
        assert_eq!(ConvGeometry::new(5, 4, 4, 3).with_padding(Padding::uniform(1)).dim_im_out, 5);
        let g = ConvGeometry::new(7, 4, 4, 3)
            .with_padding(Padding { left: 1, right: 0, top: 2, bottom: 0 })
            .with_stride(2);
        assert_eq!(g.dim_im_out, 3);
        let taller = g.with_padding(Padding { left: 1, right: 0, top: 2, bottom: 5 });
        assert_eq!(taller.dim_im_out, 3);
        assert_eq!(ConvGeometry::new(2, 4, 4, 3).dim_im_out, 0);
    }

    #[test]
    fn test_channel_constraint() {
        assert_eq!(ChannelConstraint::for_output::<U2>().out_factor, 4);
        assert_eq!(ChannelConstraint::for_output::<U4>().out_factor, 2);
        assert_eq!(ChannelConstraint::for_output::<U8>().out_factor, 2);
        let c = ChannelConstraint::for_output::<U2>().at_least(16, 16);
        assert_eq!((c.in_factor, c.out_factor), (16, 16));
        assert!(c.check(32, 16).is_ok());
        assert_eq!(
            c.check(8, 16),
            Err(KernelError::SizeMismatch { ch_im_in: 8, ch_im_out: 16, in_factor: 16, out_factor: 16 })
        );
    }

    #[test]
    fn test_caller_constraint_cannot_relax_output_requirements() {
        // A u8-output constraint (pairs of channels) handed to a u2-output
        // call still needs whole output bytes per pixel.
        let g = ConvGeometry::new(3, 4, 2, 1);
        let input = vec![0u8; 36];
        let weights = vec![0u8; 8];
        let mut out = vec![0x55u8; 5];
        let mut buf = vec![0i16; g.buffer_a_len()];
        let r = conv_hwc_with::<U8, U8, U2, _, Scalar>(
            ChannelConstraint::for_output::<U8>().at_least(0, 0),
            Packed::new(&input),
            &g,
            Packed::new(&weights),
            &[0; 2],
            0,
            WeightOffsets::Scalar(0),
            &PactCh,
            PackedMut::new(&mut out),
            &mut buf,
        );
        assert_eq!(
            r,
            Err(KernelError::SizeMismatch { ch_im_in: 4, ch_im_out: 2, in_factor: 4, out_factor: 4 })
        );
        assert!(out.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn test_at_least_ignores_zero_factors() {
        let c = ChannelConstraint::for_output::<U4>().at_least(0, 0);
        assert_eq!((c.in_factor(), c.out_factor()), (4, 2));
        assert!(c.check(4, 2).is_ok());
        assert!(c.check(2, 2).is_err());
    }

    #[test]
    fn test_size_mismatch_writes_nothing() {
        let g = ConvGeometry::new(3, 6, 4, 1);
        let input = vec![0u8; 54];
        let weights = vec![0u8; 24];
        let mut out = vec![0xAAu8; 9];
        let mut buf = vec![0i16; g.buffer_a_len()];
        let r = conv_hwc::<U8, U8, U4, _>(
            Packed::new(&input),
            &g,
            Packed::new(&weights),
            &[0; 4],
            0,
            WeightOffsets::Scalar(0),
            &PactCh,
            PackedMut::new(&mut out),
            &mut buf,
        );
        assert!(matches!(r, Err(KernelError::SizeMismatch { .. })));
        assert!(out.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_short_scratch_buffer_rejected() {
        let g = ConvGeometry::new(3, 4, 4, 3);
        let input = vec![0u8; 36];
        let weights = vec![0u8; 144];
        let mut out = vec![0u8; 2];
        let mut buf = vec![0i16; g.buffer_a_len() - 1];
        let r = conv_hwc::<U8, U8, U4, _>(
            Packed::new(&input),
            &g,
            Packed::new(&weights),
            &[0; 4],
            0,
            WeightOffsets::Scalar(0),
            &PactCh,
            PackedMut::new(&mut out),
            &mut buf,
        );
        assert_eq!(r, Err(KernelError::BufferTooSmall { buffer: "bufferA", needed: 72, got: 71 }));
    }
}
