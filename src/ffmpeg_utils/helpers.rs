//! Safe wrappers around FFmpeg FFI calls.
//!
//! Every function in this module is `pub` and **safe** to call.  All `unsafe`
//! blocks are contained here with explicit safety arguments.  Callers outside
//! this module should never need to write `unsafe` for routine FFmpeg access.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi::AVPacketSideDataType;

/// Size in bytes of a display matrix side-data entry (3x3 `i32`).
const DISPLAY_MATRIX_BYTES: usize = 9 * std::mem::size_of::<i32>();

// ── Codec-parameter field accessors ─────────────────────────────────────────

/// Read `width` from an `AVCodecParameters` struct.
pub fn codec_params_width(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    // SAFETY: `params.as_ptr()` returns a valid non-null pointer for the
    // lifetime of `params`.  `width` is a plain i32 field.
    unsafe { (*params.as_ptr()).width as u32 }
}

/// Read `height` from an `AVCodecParameters` struct.
pub fn codec_params_height(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    // SAFETY: same as `codec_params_width`.
    unsafe { (*params.as_ptr()).height as u32 }
}

/// Read `sample_rate` from an `AVCodecParameters` struct.
pub fn codec_params_sample_rate(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    // SAFETY: same as `codec_params_width`.
    unsafe { (*params.as_ptr()).sample_rate as u32 }
}

/// Read `ch_layout.nb_channels` from an `AVCodecParameters` struct.
pub fn codec_params_channels(params: &ffmpeg::codec::parameters::Parameters) -> u16 {
    // SAFETY: same as `codec_params_width`.
    unsafe { (*params.as_ptr()).ch_layout.nb_channels as u16 }
}

/// Read the display matrix (orientation transform) attached to a stream's
/// codec parameters, if any.
pub fn codec_params_display_matrix(
    params: &ffmpeg::codec::parameters::Parameters,
) -> Option<[i32; 9]> {
    // SAFETY: `coded_side_data`/`nb_coded_side_data` describe an array owned by
    // the parameters struct, valid for the lifetime of `params`.
    // `av_packet_side_data_get` only reads it.  The entry's size is checked
    // before reading nine i32 values; reads are unaligned-tolerant.
    unsafe {
        let p = params.as_ptr();
        let sd = ffmpeg::ffi::av_packet_side_data_get(
            (*p).coded_side_data,
            (*p).nb_coded_side_data,
            AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
        );
        if sd.is_null() || (*sd).data.is_null() || (*sd).size < DISPLAY_MATRIX_BYTES {
            return None;
        }
        let src = (*sd).data as *const i32;
        let mut matrix = [0i32; 9];
        for (i, slot) in matrix.iter_mut().enumerate() {
            *slot = std::ptr::read_unaligned(src.add(i));
        }
        Some(matrix)
    }
}

/// Attach a display matrix to an output stream's codec parameters.
///
/// Must be called after `set_parameters(...)` (which replaces the side data)
/// and before `write_header`.  Returns `false` if allocation failed.
pub fn stream_set_display_matrix(
    out_stream: &mut ffmpeg::format::stream::StreamMut,
    matrix: &[i32; 9],
) -> bool {
    // SAFETY: `out_stream.as_mut_ptr()` is valid for the lifetime of the
    // stream and `codecpar` is non-null for streams created by
    // `add_stream`.  `av_packet_side_data_new` (re)allocates the side-data
    // array and returns an entry with `size` bytes of writable data.
    unsafe {
        let par = (*out_stream.as_mut_ptr()).codecpar;
        if par.is_null() {
            return false;
        }
        let sd = ffmpeg::ffi::av_packet_side_data_new(
            &mut (*par).coded_side_data,
            &mut (*par).nb_coded_side_data,
            AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
            DISPLAY_MATRIX_BYTES,
            0,
        );
        if sd.is_null() || (*sd).data.is_null() {
            return false;
        }
        let dst = (*sd).data as *mut i32;
        for (i, v) in matrix.iter().enumerate() {
            std::ptr::write_unaligned(dst.add(i), *v);
        }
        true
    }
}

/// Zero out `codec_tag` on the `AVCodecParameters` attached to an output
/// stream, so the muxer picks the correct tag for the target container.
///
/// Must be called after `out_stream.set_parameters(...)` and before
/// `write_header`.
pub fn stream_reset_codec_tag(out_stream: &mut ffmpeg::format::stream::StreamMut) {
    // SAFETY: `out_stream.as_mut_ptr()` is valid for the lifetime of the
    // stream.  `codecpar` is set by `set_parameters` and is non-null.
    // `codec_tag` is a plain u32 field.
    unsafe {
        (*(*out_stream.as_mut_ptr()).codecpar).codec_tag = 0;
    }
}

/// Allocate a fresh `AVCodecParameters`, copy an opened encoder context into
/// it, and return it as a safe `ffmpeg::codec::Parameters`.
///
/// Used to describe an encoded stream to the muxer. Pass the encoder itself;
/// it derefs to its codec context.
pub fn encoder_codec_parameters(ctx: &ffmpeg::codec::Context) -> ffmpeg::codec::Parameters {
    use std::rc::Rc;
    // SAFETY: `avcodec_parameters_alloc` returns a valid pointer or null
    // (null only under OOM).  `avcodec_parameters_from_context` copies fields
    // from a valid, open encoder context.
    unsafe {
        let params = ffmpeg::ffi::avcodec_parameters_alloc();
        ffmpeg::ffi::avcodec_parameters_from_context(params, ctx.as_ptr());
        ffmpeg::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>)
    }
}

/// Tell the demuxer to drop every stream except `keep`.
///
/// Each track reader owns its own demuxer; discarding the other streams keeps
/// it from buffering packets nobody will consume.
pub fn input_discard_other_streams(input: &mut ffmpeg::format::context::Input, keep: usize) {
    // SAFETY: `input.as_mut_ptr()` is valid for the lifetime of `input`;
    // `streams` holds `nb_streams` valid stream pointers.  `discard` is a
    // plain enum field read by the demuxer.
    unsafe {
        let ctx = input.as_mut_ptr();
        for i in 0..(*ctx).nb_streams as usize {
            if i == keep {
                continue;
            }
            let st = *(*ctx).streams.add(i);
            if !st.is_null() {
                (*st).discard = ffmpeg::ffi::AVDiscard::AVDISCARD_ALL;
            }
        }
    }
}

/// Convert a timestamp from one timebase to another.
pub fn rescale_ts(ts: i64, from: ffmpeg::Rational, to: ffmpeg::Rational) -> i64 {
    // SAFETY: `av_rescale_q` is a pure arithmetic function.
    unsafe { ffmpeg::ffi::av_rescale_q(ts, from.into(), to.into()) }
}

// ── Display matrix math ─────────────────────────────────────────────────────

/// Build a display matrix describing a pure clockwise rotation.
///
/// Mirrors `av_display_rotation_set`: 16.16 fixed point for the 2x2 rotation
/// part, 2.30 for the homogeneous `w` entry.
pub fn display_matrix_clockwise(degrees: f64) -> [i32; 9] {
    let radians = -degrees.to_radians();
    let (s, c) = radians.sin_cos();
    let fixed = |x: f64| (x * 65536.0) as i32;
    let mut matrix = [0i32; 9];
    matrix[0] = fixed(c);
    matrix[1] = fixed(-s);
    matrix[3] = fixed(s);
    matrix[4] = fixed(c);
    matrix[8] = 1 << 30;
    matrix
}

/// Counterclockwise rotation (degrees) encoded in a display matrix.
///
/// Mirrors `av_display_rotation_get`; `None` for a degenerate matrix.
pub fn display_matrix_rotation(matrix: &[i32; 9]) -> Option<f64> {
    let fp = |x: i32| x as f64 / 65536.0;
    let scale0 = fp(matrix[0]).hypot(fp(matrix[3]));
    let scale1 = fp(matrix[1]).hypot(fp(matrix[4]));
    if scale0 == 0.0 || scale1 == 0.0 {
        return None;
    }
    let rotation = (fp(matrix[1]) / scale1)
        .atan2(fp(matrix[0]) / scale0)
        .to_degrees();
    Some(-rotation)
}
