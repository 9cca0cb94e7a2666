//! Audio region rendering
//!
//! Mixes an audio region into stereo output buffers for one cycle segment.
//! Content is read through the region's loop window; edge fades use the
//! region's fade settings and loop seams get a short fixed equal-power
//! ramp on both sides of the wrap so repeats never click.
//!
//! This path is called on the audio thread: it never allocates and never
//! errors. An unresolvable clip renders as silence.

use ll_state::{ClipPool, Region, RegionData};

use crate::midi_fill::for_each_chunk;
use crate::CycleTimeInfo;

/// Ramp length applied on each side of a loop wrap
pub const SEAM_FADE_FRAMES: i64 = 64;

fn equal_power(t: f64) -> f32 {
    (t.clamp(0.0, 1.0) * std::f64::consts::FRAC_PI_2).sin() as f32
}

/// Mix one audio region into `out_l`/`out_r` for a cycle segment.
///
/// The output slices cover the whole host buffer; the segment's
/// `local_offset` indexes into them. Existing content is summed with, not
/// replaced.
pub fn fill_region_audio(
    region: &Region,
    pool: &ClipPool,
    cycle: &CycleTimeInfo,
    out_l: &mut [f32],
    out_r: &mut [f32],
) {
    let RegionData::Audio {
        clip_id,
        gain,
        fade_in,
        fade_out,
        ..
    } = &region.data
    else {
        return;
    };
    if region.muted {
        return;
    }
    let Some(clip) = pool.get(*clip_id) else {
        return;
    };

    let region_len = region.length_frames();
    let loop_len = region.loop_length_frames();
    // frame offset (region-relative) at which the first wrap happens
    let first_wrap = region.loop_end.frames - region.clip_start.frames;
    let seam_active = region.is_looped() && loop_len > 2 * SEAM_FADE_FRAMES;

    for_each_chunk(region, cycle, |chunk| {
        for i in 0..chunk.nframes as i64 {
            let local = chunk.r_local + i;
            if local < 0 {
                continue;
            }
            let out_idx = (chunk.buf_base + i as u32) as usize;
            if out_idx >= out_l.len() || out_idx >= out_r.len() {
                break;
            }

            let mut g = *gain;
            let offset_in_region =
                chunk.buf_base as i64 + i - cycle.local_offset as i64 + cycle.start_frame
                    - region.pos.frames;
            if fade_in.length > 0 && (offset_in_region as u64) < fade_in.length {
                g *= fade_in.gain_at(offset_in_region as u64);
            }
            let till_end = region_len - offset_in_region;
            if fade_out.length > 0 && (till_end as u64) <= fade_out.length {
                g *= fade_out.gain_at(till_end as u64);
            }
            if seam_active {
                // outgoing ramp, only when a wrap actually follows
                let till_wrap = region.loop_end.frames - local;
                if till_wrap <= SEAM_FADE_FRAMES && offset_in_region + till_wrap < region_len {
                    g *= equal_power(till_wrap as f64 / SEAM_FADE_FRAMES as f64);
                }
                // incoming ramp after any completed wrap
                if offset_in_region >= first_wrap {
                    let since_window = local - region.loop_start.frames;
                    if (0..SEAM_FADE_FRAMES).contains(&since_window) {
                        g *= equal_power(since_window as f64 / SEAM_FADE_FRAMES as f64);
                    }
                }
            }

            let frame = local as usize;
            let (l, r) = if clip.channels >= 2 {
                (clip.sample(0, frame), clip.sample(1, frame))
            } else {
                let s = clip.sample(0, frame);
                (s, s)
            };
            out_l[out_idx] += l * g;
            out_r[out_idx] += r * g;
        }
    });
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use ll_core::{track_name_hash, Position, RegionId, RegionType, TempoMap};
    use ll_state::{AudioClip, FadeCurve, FadeSettings};

    fn setup(clip_frames: usize) -> (TempoMap, ClipPool, u64) {
        let map = TempoMap::new(48000);
        let mut pool = ClipPool::new();
        // constant mono 1.0
        let id = pool.add(AudioClip::new("c", 1, 48000, vec![1.0; clip_frames]));
        (map, pool, id)
    }

    fn audio_region(map: &TempoMap, clip_id: u64, start: f64, end: f64) -> Region {
        Region::new(
            RegionId::new(RegionType::Audio, track_name_hash("Audio"), 0, 0),
            "a",
            Position::from_ticks(start, map),
            Position::from_ticks(end, map),
            RegionData::Audio {
                clip_id,
                gain: 1.0,
                fade_in: FadeSettings::default(),
                fade_out: FadeSettings::default(),
                stretch_ratio: 1.0,
            },
            map,
        )
    }

    #[test]
    fn test_fills_inside_region_silence_outside() {
        let (map, pool, clip) = setup(200000);
        let r = audio_region(&map, clip, 0.0, 3840.0); // [0, 96000) frames
        let mut l = vec![0.0f32; 64];
        let mut rr = vec![0.0f32; 64];
        // cycle straddling the region end
        fill_region_audio(
            &r,
            &pool,
            &CycleTimeInfo::new(r.end_pos.frames - 32, 64, 0),
            &mut l,
            &mut rr,
        );
        assert!(l[..32].iter().all(|&s| s == 1.0));
        assert!(l[32..].iter().all(|&s| s == 0.0));
        assert_eq!(l, rr);
    }

    #[test]
    fn test_gain_applied() {
        let (map, pool, clip) = setup(200000);
        let mut r = audio_region(&map, clip, 0.0, 3840.0);
        if let RegionData::Audio { gain, .. } = &mut r.data {
            *gain = 0.5;
        }
        let mut l = vec![0.0f32; 16];
        let mut rr = vec![0.0f32; 16];
        fill_region_audio(&r, &pool, &CycleTimeInfo::new(1000, 16, 0), &mut l, &mut rr);
        assert!(l.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_fade_in_ramps_from_silence() {
        let (map, pool, clip) = setup(200000);
        let mut r = audio_region(&map, clip, 0.0, 3840.0);
        if let RegionData::Audio { fade_in, .. } = &mut r.data {
            *fade_in = FadeSettings {
                length: 100,
                curve: FadeCurve::Linear,
            };
        }
        let mut l = vec![0.0f32; 100];
        let mut rr = vec![0.0f32; 100];
        fill_region_audio(&r, &pool, &CycleTimeInfo::new(0, 100, 0), &mut l, &mut rr);
        assert_eq!(l[0], 0.0);
        assert!(l[50] > 0.4 && l[50] < 0.6);
        assert!(l[99] > 0.9);
    }

    #[test]
    fn test_loop_seam_is_attenuated() {
        let (map, pool, clip) = setup(400000);
        let mut r = audio_region(&map, clip, 0.0, 7680.0); // two bars
        r.loop_end = Position::from_ticks(3840.0, &map); // wrap at 96000
        let wrap = r.loop_end.frames;

        let n = (2 * SEAM_FADE_FRAMES) as u32;
        let mut l = vec![0.0f32; n as usize];
        let mut rr = vec![0.0f32; n as usize];
        fill_region_audio(
            &r,
            &pool,
            &CycleTimeInfo::new(wrap - SEAM_FADE_FRAMES, n, 0),
            &mut l,
            &mut rr,
        );
        let last_before = l[(SEAM_FADE_FRAMES - 1) as usize];
        let first_after = l[SEAM_FADE_FRAMES as usize];
        assert!(last_before < 0.1, "outgoing seam not faded: {last_before}");
        assert!(first_after < 0.1, "incoming seam not faded: {first_after}");
        // mid-window content is untouched
        assert_eq!(l[0], 1.0);
    }

    #[test]
    fn test_missing_clip_renders_silence() {
        let (map, pool, _clip) = setup(1000);
        let r = audio_region(&map, 999, 0.0, 3840.0);
        let mut l = vec![0.0f32; 32];
        let mut rr = vec![0.0f32; 32];
        fill_region_audio(&r, &pool, &CycleTimeInfo::new(0, 32, 0), &mut l, &mut rr);
        assert!(l.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_muted_region_renders_silence() {
        let (map, pool, clip) = setup(200000);
        let mut r = audio_region(&map, clip, 0.0, 3840.0);
        r.muted = true;
        let mut l = vec![0.0f32; 32];
        let mut rr = vec![0.0f32; 32];
        fill_region_audio(&r, &pool, &CycleTimeInfo::new(0, 32, 0), &mut l, &mut rr);
        assert!(l.iter().all(|&s| s == 0.0));
    }
}
