//! Standard MIDI File writer.
//!
//! Format 1 and 2 scores get a conductor chunk (tempo, signatures, markers
//! and score-level raw events) followed by one chunk per track. Format 0
//! writes everything into a single chunk; a format-0 score holding more
//! than one track is promoted to format 1.

use tracing::{debug, warn};

use super::vlq::{write_vlq, MAX_VLQ_VALUE};
use super::EncodeOptions;
use crate::error::CodecError;
use crate::event::{KeyMode, Note, PitchBend, RawEvent, MAX_MSPQ};
use crate::score::{check_resolution, Format, Score};
use crate::track::Track;
use crate::unit::Tick;

const SUSTAIN_CONTROLLER: u8 = 64;

/// Order of events sharing a tick. Releases come before new onsets so a
/// repeated pitch re-pairs correctly; zero-length notes release last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Meta,
    Program,
    Control,
    NoteOff,
    NoteOn,
    ZeroLengthNoteOff,
}

#[derive(Debug, Clone)]
enum Message {
    /// A channel voice message, eligible for running status.
    Channel { status: u8, data: [u8; 2], len: usize },
    /// Meta, sysex and raw events, written verbatim.
    Verbatim(Vec<u8>),
}

#[derive(Debug, Clone)]
struct WireEvent {
    tick: i64,
    rank: Rank,
    message: Message,
}

impl WireEvent {
    fn channel(tick: i64, rank: Rank, status: u8, data: &[u8]) -> Self {
        let mut bytes = [0u8; 2];
        bytes[..data.len()].copy_from_slice(data);
        WireEvent {
            tick,
            rank,
            message: Message::Channel {
                status,
                data: bytes,
                len: data.len(),
            },
        }
    }

    fn verbatim(tick: i64, rank: Rank, bytes: Vec<u8>) -> Self {
        WireEvent {
            tick,
            rank,
            message: Message::Verbatim(bytes),
        }
    }
}

pub(crate) fn encode(score: &Score<Tick>, options: &EncodeOptions) -> Result<Vec<u8>, CodecError> {
    check_resolution(score.ticks_per_quarter)?;

    let format = match score.format {
        Format::SingleTrack if score.tracks.len() > 1 => {
            debug!(
                tracks = score.tracks.len(),
                "promoting multi-track format 0 score to format 1"
            );
            Format::Parallel
        }
        format => format,
    };

    let mut chunks = Vec::with_capacity(score.tracks.len() + 1);
    match format {
        Format::SingleTrack => {
            // One chunk holds one name: the track's, else the title.
            let named_track = score.tracks.first().is_some_and(|t| !t.name.is_empty());
            let title = (!named_track).then_some(score.title.as_str());
            let mut events = global_events(score, title)?;
            if let Some(track) = score.tracks.first() {
                events.extend(track_events(track, 0, options)?);
            }
            chunks.push(write_chunk(events, 0, options)?);
        }
        Format::Parallel | Format::Sequential => {
            let conductor = global_events(score, Some(score.title.as_str()))?;
            chunks.push(write_chunk(conductor, 0, options)?);
            for (i, track) in score.tracks.iter().enumerate() {
                let index = i + 1;
                let events = track_events(track, index, options)?;
                chunks.push(write_chunk(events, index, options)?);
            }
        }
    }

    let bytes = build_file(format, score.ticks_per_quarter, &chunks)?;
    debug!(
        format = format.as_u16(),
        chunks = chunks.len(),
        notes = score.note_count(),
        bytes = bytes.len(),
        "encoded midi file"
    );
    Ok(bytes)
}

fn build_file(
    format: Format,
    ticks_per_quarter: u16,
    chunks: &[Vec<u8>],
) -> Result<Vec<u8>, CodecError> {
    let count = u16::try_from(chunks.len()).map_err(|_| CodecError::ValueOutOfRange {
        field: "track count",
        value: chunks.len() as i64,
    })?;

    let body: usize = chunks.iter().map(|c| c.len() + 8).sum();
    let mut out = Vec::with_capacity(14 + body);
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&format.as_u16().to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    out.extend_from_slice(&ticks_per_quarter.to_be_bytes());

    for chunk in chunks {
        let length = u32::try_from(chunk.len()).map_err(|_| CodecError::ValueOutOfRange {
            field: "track chunk length",
            value: chunk.len() as i64,
        })?;
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(chunk);
    }
    Ok(out)
}

/// Sort by (tick, rank), keeping insertion order inside a rank, and write
/// delta-timed events followed by end-of-track.
fn write_chunk(
    mut events: Vec<WireEvent>,
    track: usize,
    options: &EncodeOptions,
) -> Result<Vec<u8>, CodecError> {
    events.sort_by(|a, b| a.tick.cmp(&b.tick).then(a.rank.cmp(&b.rank)));

    let mut data = Vec::new();
    let mut previous = 0i64;
    let mut running: Option<u8> = None;
    for event in events {
        let delta = event.tick - previous;
        if delta < 0 {
            return Err(CodecError::NonMonotonicEvent {
                track,
                previous,
                tick: event.tick,
            });
        }
        if delta > MAX_VLQ_VALUE as i64 {
            return Err(CodecError::ValueOutOfRange {
                field: "delta time",
                value: delta,
            });
        }
        write_vlq(&mut data, delta as u32);

        match event.message {
            Message::Channel { status, data: bytes, len } => {
                let status = if options.note_off_as_zero_velocity && status & 0xF0 == 0x80 {
                    0x90 | (status & 0x0F)
                } else {
                    status
                };
                if !(options.running_status && running == Some(status)) {
                    data.push(status);
                    running = Some(status);
                }
                data.extend_from_slice(&bytes[..len]);
            }
            Message::Verbatim(bytes) => {
                data.extend_from_slice(&bytes);
                running = None;
            }
        }
        previous = event.tick;
    }

    data.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
    Ok(data)
}

fn global_events(score: &Score<Tick>, title: Option<&str>) -> Result<Vec<WireEvent>, CodecError> {
    let mut events = Vec::new();

    if let Some(title) = title.filter(|t| !t.is_empty()) {
        events.push(WireEvent::verbatim(0, Rank::Meta, meta(0x03, title.as_bytes())?));
    }

    for tempo in &score.tempos {
        if tempo.mspq == 0 || tempo.mspq > MAX_MSPQ {
            return Err(CodecError::ValueOutOfRange {
                field: "tempo",
                value: tempo.mspq as i64,
            });
        }
        let [_, a, b, c] = tempo.mspq.to_be_bytes();
        events.push(WireEvent::verbatim(tempo.time, Rank::Meta, meta(0x51, &[a, b, c])?));
    }

    for sig in &score.time_signatures {
        if sig.numerator == 0 {
            return Err(CodecError::ValueOutOfRange {
                field: "time signature numerator",
                value: 0,
            });
        }
        if !sig.denominator.is_power_of_two() {
            return Err(CodecError::ValueOutOfRange {
                field: "time signature denominator",
                value: sig.denominator as i64,
            });
        }
        let log2 = sig.denominator.trailing_zeros() as u8;
        // 24 clocks per metronome click, 8 thirty-seconds per quarter.
        let payload = [sig.numerator, log2, 24, 8];
        events.push(WireEvent::verbatim(sig.time, Rank::Meta, meta(0x58, &payload)?));
    }

    for sig in &score.key_signatures {
        if !(-7..=7).contains(&sig.key) {
            return Err(CodecError::ValueOutOfRange {
                field: "key signature",
                value: sig.key as i64,
            });
        }
        let mode = match sig.mode {
            KeyMode::Major => 0,
            KeyMode::Minor => 1,
        };
        events.push(WireEvent::verbatim(
            sig.time,
            Rank::Meta,
            meta(0x59, &[sig.key as u8, mode])?,
        ));
    }

    for marker in &score.markers {
        events.push(WireEvent::verbatim(
            marker.time,
            Rank::Meta,
            meta(0x06, marker.text.as_bytes())?,
        ));
    }

    events.extend(score.raw.iter().map(raw_event));
    Ok(events)
}

fn track_events(
    track: &Track<Tick>,
    index: usize,
    options: &EncodeOptions,
) -> Result<Vec<WireEvent>, CodecError> {
    let mut events = Vec::new();

    if !track.name.is_empty() {
        events.push(WireEvent::verbatim(0, Rank::Meta, meta(0x03, track.name.as_bytes())?));
    }

    let program = seven_bit("program", track.program)?;
    if program != 0 || has_channel_events(track) {
        let channel = track.channel();
        events.push(WireEvent::channel(0, Rank::Program, 0xC0 | channel, &[program]));
    }

    let mut notes: Vec<&Note<Tick>> = track.notes.iter().collect();
    notes.sort_by_key(|n| n.time);
    super::order_unisons(&mut notes, true);
    for note in notes {
        let channel = nibble(note.channel)?;
        let pitch = seven_bit("pitch", note.pitch)?;
        let velocity = seven_bit("velocity", note.velocity)?;
        if note.duration < 0 {
            return Err(CodecError::ValueOutOfRange {
                field: "note duration",
                value: note.duration,
            });
        }
        if velocity == 0 {
            warn!(
                track = index,
                tick = note.time,
                pitch,
                "velocity 0 note-on reads back as a note-off"
            );
        }
        events.push(WireEvent::channel(
            note.time,
            Rank::NoteOn,
            0x90 | channel,
            &[pitch, velocity],
        ));
        let rank = if note.duration == 0 {
            Rank::ZeroLengthNoteOff
        } else {
            Rank::NoteOff
        };
        events.push(note_off(note.time + note.duration, rank, channel, pitch));
    }

    for control in &track.controls {
        let channel = nibble(control.channel)?;
        let number = seven_bit("controller number", control.number)?;
        if number == SUSTAIN_CONTROLLER && !options.sustain_controls {
            return Err(CodecError::ValueOutOfRange {
                field: "sustain controller (use pedals)",
                value: number as i64,
            });
        }
        let value = seven_bit("controller value", control.value)?;
        events.push(WireEvent::channel(
            control.time,
            Rank::Control,
            0xB0 | channel,
            &[number, value],
        ));
    }

    for bend in &track.pitch_bends {
        let channel = nibble(bend.channel)?;
        if !(PitchBend::<Tick>::MIN..=PitchBend::<Tick>::MAX).contains(&bend.value) {
            return Err(CodecError::ValueOutOfRange {
                field: "pitch bend",
                value: bend.value as i64,
            });
        }
        let raw = (bend.value + 8192) as u16;
        events.push(WireEvent::channel(
            bend.time,
            Rank::Control,
            0xE0 | channel,
            &[(raw & 0x7F) as u8, (raw >> 7) as u8],
        ));
    }

    let mut pedals: Vec<_> = track.pedals.iter().collect();
    pedals.sort_by_key(|p| p.time);
    for pedal in pedals {
        let channel = nibble(pedal.channel)?;
        if pedal.duration < 0 {
            return Err(CodecError::ValueOutOfRange {
                field: "pedal duration",
                value: pedal.duration,
            });
        }
        let status = 0xB0 | channel;
        events.push(WireEvent::channel(
            pedal.time,
            Rank::Control,
            status,
            &[SUSTAIN_CONTROLLER, 127],
        ));
        events.push(WireEvent::channel(
            pedal.time + pedal.duration,
            Rank::Control,
            status,
            &[SUSTAIN_CONTROLLER, 0],
        ));
    }

    for lyric in &track.lyrics {
        events.push(WireEvent::verbatim(
            lyric.time,
            Rank::Meta,
            meta(0x05, lyric.text.as_bytes())?,
        ));
    }

    events.extend(track.raw.iter().map(raw_event));
    Ok(events)
}

fn has_channel_events(track: &Track<Tick>) -> bool {
    !track.notes.is_empty()
        || !track.controls.is_empty()
        || !track.pitch_bends.is_empty()
        || !track.pedals.is_empty()
        || track.raw.iter().any(|r| (0x80..0xF0).contains(&r.status()))
}

/// A 0x80 release; `write_chunk` may rewrite it as note-on velocity 0.
fn note_off(tick: i64, rank: Rank, channel: u8, pitch: u8) -> WireEvent {
    WireEvent {
        tick,
        rank,
        message: Message::Channel {
            status: 0x80 | channel,
            data: [pitch, 0],
            len: 2,
        },
    }
}

fn raw_event(raw: &RawEvent<Tick>) -> WireEvent {
    let rank = if (0x80..0xF0).contains(&raw.status()) {
        Rank::Control
    } else {
        Rank::Meta
    };
    WireEvent::verbatim(raw.time, rank, raw.bytes.clone())
}

fn meta(kind: u8, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    if payload.len() > MAX_VLQ_VALUE as usize {
        return Err(CodecError::ValueOutOfRange {
            field: "meta event length",
            value: payload.len() as i64,
        });
    }
    let mut bytes = Vec::with_capacity(payload.len() + 6);
    bytes.push(0xFF);
    bytes.push(kind);
    write_vlq(&mut bytes, payload.len() as u32);
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

fn seven_bit(field: &'static str, value: u8) -> Result<u8, CodecError> {
    if value > 127 {
        return Err(CodecError::ValueOutOfRange {
            field,
            value: value as i64,
        });
    }
    Ok(value)
}

fn nibble(channel: u8) -> Result<u8, CodecError> {
    if channel > 15 {
        return Err(CodecError::ValueOutOfRange {
            field: "channel",
            value: channel as i64,
        });
    }
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ControlChange, Tempo};

    fn one_note_score() -> Score<Tick> {
        let mut score = Score::new(480).unwrap();
        score.tempos.push(Tempo::from_qpm(0, 120.0).unwrap());
        let mut track = Track::new("", 0, false).unwrap();
        track.notes.push(Note::new(0, 480, 60, 100).unwrap());
        score.tracks.push(track);
        score
    }

    #[test]
    fn writes_header_and_conductor_chunk() {
        let bytes = encode(&one_note_score(), &EncodeOptions::default()).unwrap();
        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 6]);
        assert_eq!(&bytes[8..10], &[0, 1]);
        assert_eq!(&bytes[10..12], &[0, 2]);
        assert_eq!(&bytes[12..14], &[0x01, 0xE0]);

        // conductor: tempo meta then end-of-track
        assert_eq!(&bytes[14..18], b"MTrk");
        assert_eq!(&bytes[18..22], &[0, 0, 0, 11]);
        assert_eq!(
            &bytes[22..33],
            &[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, 0x00, 0xFF, 0x2F, 0x00]
        );
    }

    #[test]
    fn note_chunk_body() {
        let bytes = encode(&one_note_score(), &EncodeOptions::default()).unwrap();
        let track = &bytes[33..];
        assert_eq!(&track[0..4], b"MTrk");
        assert_eq!(
            &track[8..],
            &[
                0x00, 0xC0, 0x00, // program
                0x00, 0x90, 0x3C, 0x64, // note on
                0x83, 0x60, 0x3C, 0x00, // note-on velocity 0, running status
                0x00, 0xFF, 0x2F, 0x00,
            ]
        );

        let explicit = encode(
            &one_note_score(),
            &EncodeOptions {
                note_off_as_zero_velocity: false,
                ..EncodeOptions::default()
            },
        )
        .unwrap();
        assert_eq!(&explicit[33 + 15..33 + 20], &[0x83, 0x60, 0x80, 0x3C, 0x00]);
    }

    #[test]
    fn running_status_drops_repeated_status_bytes() {
        let mut score = one_note_score();
        score.tracks[0].notes.push(Note::new(0, 480, 64, 100).unwrap());
        let with = encode(&score, &EncodeOptions::default()).unwrap();
        let without = encode(
            &score,
            &EncodeOptions {
                running_status: false,
                ..EncodeOptions::default()
            },
        )
        .unwrap();
        // second note-on and both releases reuse 0x90
        assert_eq!(without.len() - with.len(), 3);
    }

    #[test]
    fn negative_times_are_rejected() {
        let mut score = one_note_score();
        score.tracks[0].notes[0].time = -5;
        assert_eq!(
            encode(&score, &EncodeOptions::default()).unwrap_err(),
            CodecError::NonMonotonicEvent {
                track: 1,
                previous: 0,
                tick: -5
            }
        );
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        let mut score = one_note_score();
        score.tracks[0].notes[0].pitch = 200;
        assert!(matches!(
            encode(&score, &EncodeOptions::default()),
            Err(CodecError::ValueOutOfRange { field: "pitch", value: 200 })
        ));

        let mut score = one_note_score();
        score.time_signatures.push(crate::event::TimeSignature {
            time: 0,
            numerator: 3,
            denominator: 6,
        });
        assert!(matches!(
            encode(&score, &EncodeOptions::default()),
            Err(CodecError::ValueOutOfRange { value: 6, .. })
        ));
    }

    #[test]
    fn sustain_controls_need_opt_in() {
        let mut score = one_note_score();
        score.tracks[0]
            .controls
            .push(ControlChange::new(0, SUSTAIN_CONTROLLER, 127).unwrap());
        assert!(matches!(
            encode(&score, &EncodeOptions::default()),
            Err(CodecError::ValueOutOfRange { value: 64, .. })
        ));

        let options = EncodeOptions {
            sustain_controls: true,
            ..EncodeOptions::default()
        };
        let bytes = encode(&score, &options).unwrap();
        assert!(bytes.windows(3).any(|w| w == [0xB0, 0x40, 0x7F]));
    }

    #[test]
    fn program_change_only_for_playing_tracks() {
        let mut score = Score::new(480).unwrap();
        score.tracks.push(Track::new("Empty", 0, false).unwrap());
        let bytes = encode(&score, &EncodeOptions::default()).unwrap();
        // conductor is only end-of-track; the track chunk holds its name
        assert_eq!(
            &bytes[26..],
            &[
                b'M', b'T', b'r', b'k', 0, 0, 0, 13, //
                0x00, 0xFF, 0x03, 0x05, b'E', b'm', b'p', b't', b'y', //
                0x00, 0xFF, 0x2F, 0x00,
            ]
        );

        score.tracks[0].program = 19;
        let bytes = encode(&score, &EncodeOptions::default()).unwrap();
        assert_eq!(&bytes[43..46], &[0x00, 0xC0, 19]);
    }

    #[test]
    fn unison_notes_are_written_longest_first() {
        let mut score = one_note_score();
        score.tracks[0].notes = vec![
            Note::new(0, 240, 60, 100).unwrap(),
            Note::new(0, 480, 60, 90).unwrap(),
        ];
        let bytes = encode(&score, &EncodeOptions::default()).unwrap();
        let track = &bytes[33 + 8..];
        assert_eq!(
            track,
            &[
                0x00, 0xC0, 0x00, //
                0x00, 0x90, 0x3C, 0x5A, // longer note first
                0x00, 0x3C, 0x64, //
                0x81, 0x70, 0x3C, 0x00, // closes the 240 tick note
                0x81, 0x70, 0x3C, 0x00, //
                0x00, 0xFF, 0x2F, 0x00,
            ]
        );
    }

    #[test]
    fn multi_track_format_zero_is_promoted() {
        let mut score = one_note_score();
        score.format = Format::SingleTrack;
        let single = encode(&score, &EncodeOptions::default()).unwrap();
        assert_eq!(&single[8..12], &[0, 0, 0, 1]);

        score.tracks.push(score.tracks[0].clone());
        let promoted = encode(&score, &EncodeOptions::default()).unwrap();
        assert_eq!(&promoted[8..12], &[0, 1, 0, 3]);
    }
}
