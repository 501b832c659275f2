//! Standard MIDI File reader.
//!
//! `Header -> TrackChunk* -> EOF`. Each track chunk is decoded by its own
//! [`ChunkDecoder`] holding all of the chunk's scanning state (running
//! status, open notes, held pedals), so chunks never share mutable state.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use super::feedback::{DecodeReport, Feedback};
use super::vlq::Reader;
use super::{Decoded, ParseOptions};
use crate::error::CodecError;
use crate::event::{
    ControlChange, KeyMode, KeySignature, Note, Pedal, PitchBend, RawEvent, Tempo, TextMeta,
    TimeSignature,
};
use crate::ops;
use crate::score::{Format, Score};
use crate::track::{Track, DRUM_CHANNEL};
use crate::unit::Tick;

const HEADER_MAGIC: &[u8; 4] = b"MThd";
const TRACK_MAGIC: &[u8; 4] = b"MTrk";
const SUSTAIN_CONTROLLER: u8 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    format: Format,
    track_count: u16,
    ticks_per_quarter: u16,
}

fn read_header(reader: &mut Reader<'_>) -> Result<Header, CodecError> {
    let magic = reader.read_slice(4)?;
    if magic != HEADER_MAGIC {
        return Err(CodecError::InvalidHeader {
            offset: 0,
            reason: format!("expected MThd, found {magic:02x?}"),
        });
    }
    let length_offset = reader.offset();
    let length = reader.read_u32_be()? as usize;
    if length < 6 {
        return Err(CodecError::InvalidHeader {
            offset: length_offset,
            reason: format!("header length {length} is shorter than 6"),
        });
    }
    let format_offset = reader.offset();
    let code = reader.read_u16_be()?;
    let format = Format::from_u16(code).ok_or_else(|| CodecError::InvalidHeader {
        offset: format_offset,
        reason: format!("unknown format {code}"),
    })?;
    let track_count = reader.read_u16_be()?;
    let division = reader.read_u16_be()?;
    if division & 0x8000 != 0 {
        return Err(CodecError::UnsupportedTimingFormat(division));
    }
    // Extra header bytes are reserved for future fields.
    reader.read_slice(length - 6)?;
    Ok(Header {
        format,
        track_count,
        ticks_per_quarter: division,
    })
}

pub(crate) fn decode(bytes: &[u8], options: &ParseOptions) -> Result<Decoded, CodecError> {
    let mut reader = Reader::new(bytes);
    let header = read_header(&mut reader)?;
    let mut score = Score::<Tick>::new(header.ticks_per_quarter)?;
    score.format = header.format;
    let mut report = DecodeReport::default();

    let mut index = 0usize;
    while index < header.track_count as usize {
        if reader.remaining() < 8 {
            return Err(CodecError::TruncatedStream {
                offset: reader.offset(),
                needed: 8 - reader.remaining(),
            });
        }
        let chunk_offset = reader.offset();
        let id = reader.read_slice(4)?;
        let length = reader.read_u32_be()? as usize;
        let base = reader.offset();
        let body = reader.read_slice(length)?;
        if id != TRACK_MAGIC {
            trace!(offset = chunk_offset, length, "skipping unknown chunk");
            report.skipped_chunks += 1;
            report.feedback.push(Feedback::info(
                format!("skipped chunk {:?}", String::from_utf8_lossy(id)),
                index,
                chunk_offset,
            ));
            continue;
        }
        let chunk = ChunkDecoder::new(body, base, index, options).run()?;
        chunk.merge_into(&mut score, &mut report);
        index += 1;
    }

    if !reader.is_empty() {
        report.feedback.push(Feedback::info(
            format!("{} trailing bytes after the last track chunk", reader.remaining()),
            index,
            reader.offset(),
        ));
    }

    ops::sort_events(&mut score.tempos);
    ops::sort_events(&mut score.time_signatures);
    ops::sort_events(&mut score.key_signatures);
    ops::sort_events(&mut score.markers);
    ops::sort_events(&mut score.raw);

    debug!(
        format = ?score.format,
        chunks = header.track_count,
        tracks = score.tracks.len(),
        ticks_per_quarter = score.ticks_per_quarter,
        notes = score.note_count(),
        unmatched_note_ons = report.unmatched_note_ons,
        "decoded midi file"
    );
    Ok(Decoded { score, report })
}

/// What one track chunk contributed.
#[derive(Debug, Default)]
struct DecodedChunk {
    /// `None` when the chunk held only score-level events.
    track: Option<Track<Tick>>,
    tempos: Vec<Tempo<Tick>>,
    time_signatures: Vec<TimeSignature<Tick>>,
    key_signatures: Vec<KeySignature<Tick>>,
    markers: Vec<TextMeta<Tick>>,
    /// Name and opaque events from a chunk without a track.
    title: String,
    raw: Vec<RawEvent<Tick>>,
    report: DecodeReport,
}

impl DecodedChunk {
    fn merge_into(self, score: &mut Score<Tick>, report: &mut DecodeReport) {
        if let Some(track) = self.track {
            score.tracks.push(track);
        }
        if score.title.is_empty() {
            score.title = self.title;
        }
        score.tempos.extend(self.tempos);
        score.time_signatures.extend(self.time_signatures);
        score.key_signatures.extend(self.key_signatures);
        score.markers.extend(self.markers);
        score.raw.extend(self.raw);
        report.absorb(self.report);
    }
}

struct ChunkDecoder<'a> {
    reader: Reader<'a>,
    index: usize,
    derive_pedals: bool,
    tick: i64,
    running_status: Option<u8>,
    /// (channel, pitch) -> stack of (note-on sequence number, onset tick, velocity)
    open_notes: HashMap<(u8, u8), Vec<(usize, i64, u8)>>,
    note_ons: usize,
    /// Closed notes keyed by the sequence number of their note-on.
    closed_notes: Vec<(usize, Note<Tick>)>,
    /// channel -> tick the pedal went down
    held_pedals: HashMap<u8, i64>,
    program_seen: bool,
    drum_decided: bool,
    name_seen: bool,
    has_track_content: bool,
    track: Track<Tick>,
    out: DecodedChunk,
}

impl<'a> ChunkDecoder<'a> {
    fn new(body: &'a [u8], base: usize, index: usize, options: &ParseOptions) -> Self {
        Self {
            reader: Reader::with_base(body, base),
            index,
            derive_pedals: options.derive_pedals,
            tick: 0,
            running_status: None,
            open_notes: HashMap::new(),
            note_ons: 0,
            closed_notes: Vec::new(),
            held_pedals: HashMap::new(),
            program_seen: false,
            drum_decided: false,
            name_seen: false,
            has_track_content: false,
            track: Track::default(),
            out: DecodedChunk::default(),
        }
    }

    fn run(mut self) -> Result<DecodedChunk, CodecError> {
        let mut ended = false;
        while !self.reader.is_empty() {
            let delta = self.reader.read_vlq()?;
            self.tick += delta as i64;

            let start = self.reader.position();
            let offset = self.reader.offset();
            let first = self.reader.peek_u8()?;
            let status = if first & 0x80 == 0 {
                self.running_status
                    .ok_or(CodecError::RunningStatusWithoutContext { offset, byte: first })?
            } else {
                self.reader.read_u8()?;
                first
            };

            match status {
                0x80..=0xEF => {
                    self.running_status = Some(status);
                    self.channel_message(status, offset)?;
                }
                0xFF => {
                    if self.meta_event(start, offset)? {
                        ended = true;
                        break;
                    }
                }
                0xF0 | 0xF7 => {
                    let length = self.reader.read_vlq()? as usize;
                    self.reader.read_slice(length)?;
                    self.push_raw(self.reader.since(start).to_vec(), offset);
                }
                _ => {
                    let length = system_data_length(status);
                    self.reader.read_slice(length)?;
                    self.push_raw(self.reader.since(start).to_vec(), offset);
                }
            }
        }

        if ended && !self.reader.is_empty() {
            self.out.report.feedback.push(Feedback::info(
                format!("{} bytes after end-of-track ignored", self.reader.remaining()),
                self.index,
                self.reader.offset(),
            ));
        } else if !ended {
            self.out.report.feedback.push(Feedback::info(
                "track chunk has no end-of-track event",
                self.index,
                self.reader.offset(),
            ));
        }
        Ok(self.finish())
    }

    fn channel_message(&mut self, status: u8, offset: usize) -> Result<(), CodecError> {
        let channel = status & 0x0F;
        let kind = status & 0xF0;
        let length = if matches!(kind, 0xC0 | 0xD0) { 1 } else { 2 };
        let bytes = self.reader.read_slice(length)?;

        let mut data = [0u8; 2];
        for (slot, &byte) in data.iter_mut().zip(bytes) {
            if byte & 0x80 != 0 {
                self.out.report.feedback.push(Feedback::info(
                    format!("data byte {byte:#04x} has its high bit set, masked"),
                    self.index,
                    offset,
                ));
            }
            *slot = byte & 0x7F;
        }

        self.has_track_content = true;
        if !self.drum_decided {
            self.track.is_drum = channel == DRUM_CHANNEL;
            self.drum_decided = true;
        }

        match kind {
            0x90 if data[1] > 0 => {
                self.open_notes
                    .entry((channel, data[0]))
                    .or_default()
                    .push((self.note_ons, self.tick, data[1]));
                self.note_ons += 1;
            }
            0x80 | 0x90 => self.close_note(channel, data[0]),
            0xB0 if self.derive_pedals && data[0] == SUSTAIN_CONTROLLER => {
                self.pedal(channel, data[1] >= 64)
            }
            0xB0 => self.track.controls.push(ControlChange {
                time: self.tick,
                number: data[0],
                value: data[1],
                channel,
            }),
            0xC0 if !self.program_seen => {
                self.track.program = data[0];
                self.track.is_drum = channel == DRUM_CHANNEL;
                self.program_seen = true;
            }
            0xE0 => {
                let raw = ((data[1] as i16) << 7) | data[0] as i16;
                self.track.pitch_bends.push(PitchBend {
                    time: self.tick,
                    value: raw - 8192,
                    channel,
                });
            }
            _ => {
                let mut bytes = vec![status];
                bytes.extend_from_slice(&data[..length]);
                self.push_raw(bytes, offset);
            }
        }
        Ok(())
    }

    /// Pops the most recent open note for this key (LIFO pairing).
    fn close_note(&mut self, channel: u8, pitch: u8) {
        let opened = self
            .open_notes
            .get_mut(&(channel, pitch))
            .and_then(Vec::pop);
        match opened {
            Some((seq, onset, velocity)) => self.closed_notes.push((
                seq,
                Note {
                    time: onset,
                    duration: self.tick - onset,
                    pitch,
                    velocity,
                    channel,
                },
            )),
            None => self.out.report.unmatched_note_offs += 1,
        }
    }

    fn pedal(&mut self, channel: u8, down: bool) {
        if down {
            self.held_pedals.entry(channel).or_insert(self.tick);
        } else if let Some(start) = self.held_pedals.remove(&channel) {
            self.track.pedals.push(Pedal {
                time: start,
                duration: self.tick - start,
                channel,
            });
        }
    }

    /// Returns `true` at end-of-track.
    fn meta_event(&mut self, start: usize, offset: usize) -> Result<bool, CodecError> {
        let kind = self.reader.read_u8()?;
        let length = self.reader.read_vlq()? as usize;
        let data = self.reader.read_slice(length)?;
        let time = self.tick;

        match kind {
            0x2F => return Ok(true),
            0x51 if length == 3 => {
                let mspq = u32::from_be_bytes([0, data[0], data[1], data[2]]);
                if mspq > 0 {
                    self.out.tempos.push(Tempo { time, mspq });
                    return Ok(false);
                }
            }
            0x58 if length >= 2 && data[0] > 0 && data[1] <= 7 => {
                self.out.time_signatures.push(TimeSignature {
                    time,
                    numerator: data[0],
                    denominator: 1 << data[1],
                });
                return Ok(false);
            }
            0x59 if length == 2 && (-7..=7).contains(&(data[0] as i8)) && data[1] <= 1 => {
                let mode = if data[1] == 1 {
                    KeyMode::Minor
                } else {
                    KeyMode::Major
                };
                self.out.key_signatures.push(KeySignature {
                    time,
                    key: data[0] as i8,
                    mode,
                });
                return Ok(false);
            }
            0x03 if !self.name_seen => {
                if let Ok(text) = std::str::from_utf8(data) {
                    self.track.name = text.to_string();
                    self.name_seen = true;
                    // A name alone leaves the first chunk a conductor; it
                    // becomes the score title.
                    if self.index > 0 {
                        self.has_track_content = true;
                    }
                    return Ok(false);
                }
            }
            0x05 => {
                if let Ok(text) = std::str::from_utf8(data) {
                    self.track.lyrics.push(TextMeta {
                        time,
                        text: text.to_string(),
                    });
                    self.has_track_content = true;
                    return Ok(false);
                }
            }
            0x06 => {
                if let Ok(text) = std::str::from_utf8(data) {
                    self.out.markers.push(TextMeta {
                        time,
                        text: text.to_string(),
                    });
                    return Ok(false);
                }
            }
            _ => {}
        }

        self.push_raw(self.reader.since(start).to_vec(), offset);
        Ok(false)
    }

    fn push_raw(&mut self, bytes: Vec<u8>, offset: usize) {
        trace!(
            track = self.index,
            offset,
            status = bytes.first().copied().unwrap_or_default(),
            len = bytes.len(),
            "keeping opaque event"
        );
        self.out.report.opaque_events += 1;
        self.track.raw.push(RawEvent {
            time: self.tick,
            bytes,
        });
    }

    fn finish(mut self) -> DecodedChunk {
        let open_notes: usize = self.open_notes.values().map(Vec::len).sum();
        if open_notes > 0 {
            warn!(
                track = self.index,
                count = open_notes,
                "dropping note-ons without a matching note-off"
            );
            self.out.report.unmatched_note_ons += open_notes;
            self.out.report.feedback.push(Feedback::warning(
                format!("{open_notes} note-ons never released, dropped"),
                self.index,
                self.reader.offset(),
            ));
        }
        let held = self.held_pedals.len();
        if held > 0 {
            self.out.report.unmatched_pedals += held;
            self.out.report.feedback.push(Feedback::warning(
                format!("{held} pedals never released, dropped"),
                self.index,
                self.reader.offset(),
            ));
        }

        // Note-on order, which is also onset order.
        self.closed_notes.sort_by_key(|(seq, _)| *seq);
        self.track.notes = self.closed_notes.into_iter().map(|(_, note)| note).collect();
        super::order_unisons(&mut self.track.notes, false);
        ops::sort_events(&mut self.track.pedals);

        if self.has_track_content {
            self.out.track = Some(self.track);
        } else {
            self.out.title = self.track.name;
            self.out.raw = self.track.raw;
        }
        self.out
    }
}

/// Data bytes following a system common or real-time status byte.
fn system_data_length(status: u8) -> usize {
    match status {
        0xF2 => 2,
        0xF1 | 0xF3 => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(format: u16, tracks: u16, division: u16) -> Vec<u8> {
        let mut bytes = b"MThd".to_vec();
        bytes.extend_from_slice(&6u32.to_be_bytes());
        bytes.extend_from_slice(&format.to_be_bytes());
        bytes.extend_from_slice(&tracks.to_be_bytes());
        bytes.extend_from_slice(&division.to_be_bytes());
        bytes
    }

    fn with_track(mut file: Vec<u8>, body: &[u8]) -> Vec<u8> {
        file.extend_from_slice(b"MTrk");
        file.extend_from_slice(&(body.len() as u32).to_be_bytes());
        file.extend_from_slice(body);
        file
    }

    fn decode_default(bytes: &[u8]) -> Result<Decoded, CodecError> {
        decode(bytes, &ParseOptions::default())
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = header(1, 0, 480);
        bytes[0] = b'X';
        assert!(matches!(
            decode_default(&bytes),
            Err(CodecError::InvalidHeader { offset: 0, .. })
        ));
    }

    #[test]
    fn rejects_smpte_division() {
        let bytes = header(1, 0, 0xE728);
        assert_eq!(
            decode_default(&bytes).unwrap_err(),
            CodecError::UnsupportedTimingFormat(0xE728)
        );
    }

    #[test]
    fn rejects_zero_division() {
        let bytes = header(1, 0, 0);
        assert!(matches!(
            decode_default(&bytes),
            Err(CodecError::Score(crate::error::ScoreError::InvalidResolution(0)))
        ));
    }

    #[test]
    fn missing_chunk_is_truncation() {
        let bytes = header(1, 1, 480);
        assert!(matches!(
            decode_default(&bytes),
            Err(CodecError::TruncatedStream { offset: 14, needed: 8 })
        ));
    }

    #[test]
    fn short_chunk_is_truncation() {
        let mut bytes = header(0, 1, 480);
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&10u32.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0xFF, 0x2F]);
        assert!(matches!(
            decode_default(&bytes),
            Err(CodecError::TruncatedStream { .. })
        ));
    }

    #[test]
    fn running_status_needs_prior_status() {
        let bytes = with_track(header(0, 1, 480), &[0x00, 0x3C, 0x40]);
        assert_eq!(
            decode_default(&bytes).unwrap_err(),
            CodecError::RunningStatusWithoutContext { offset: 23, byte: 0x3C }
        );
    }

    #[test]
    fn running_status_reuses_previous_status() {
        let body = [
            0x00, 0x90, 0x3C, 0x40, // on C4
            0x00, 0x40, 0x40, // on E4, running status
            0x83, 0x60, 0x3C, 0x00, // off C4 via velocity 0
            0x00, 0x40, 0x00, // off E4
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let decoded = decode_default(&with_track(header(0, 1, 480), &body)).unwrap();
        let notes = &decoded.score.tracks[0].notes;
        assert_eq!(notes.len(), 2);
        assert!(notes.iter().all(|n| n.time == 0 && n.duration == 480));
        assert!(decoded.report.is_clean());
    }

    #[test]
    fn overlong_delta_is_malformed() {
        let body = [0x81, 0x80, 0x80, 0x80, 0x00, 0xFF, 0x2F, 0x00];
        assert_eq!(
            decode_default(&with_track(header(0, 1, 480), &body)).unwrap_err(),
            CodecError::MalformedVarLen { offset: 22 }
        );
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let mut bytes = header(0, 1, 96);
        bytes.extend_from_slice(b"XFIH");
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[1, 2]);
        let bytes = with_track(bytes, &[0x00, 0xC0, 0x05, 0x00, 0xFF, 0x2F, 0x00]);
        let decoded = decode_default(&bytes).unwrap();
        assert_eq!(decoded.report.skipped_chunks, 1);
        assert_eq!(decoded.score.tracks[0].program, 5);
    }

    #[test]
    fn sysex_and_unknown_meta_are_kept_raw() {
        let body = [
            0x00, 0xF0, 0x03, 0x7E, 0x09, 0xF7, // GM reset fragment
            0x00, 0xFF, 0x7F, 0x02, 0x00, 0x41, // sequencer specific
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let decoded = decode_default(&with_track(header(0, 1, 96), &body)).unwrap();
        assert!(decoded.score.tracks.is_empty());
        assert_eq!(decoded.score.raw.len(), 2);
        assert_eq!(decoded.score.raw[0].bytes, vec![0xF0, 0x03, 0x7E, 0x09, 0xF7]);
        assert_eq!(decoded.score.raw[1].bytes, vec![0xFF, 0x7F, 0x02, 0x00, 0x41]);
        assert_eq!(decoded.report.opaque_events, 2);
    }

    #[test]
    fn conductor_name_becomes_title() {
        let mut file = header(1, 2, 96);
        file = with_track(
            file,
            &[
                0x00, 0xFF, 0x03, 0x04, b'S', b'o', b'n', b'g', //
                0x00, 0xFF, 0x2F, 0x00,
            ],
        );
        file = with_track(
            file,
            &[
                0x00, 0xFF, 0x03, 0x03, b'P', b'a', b'd', //
                0x00, 0xFF, 0x2F, 0x00,
            ],
        );
        let decoded = decode_default(&file).unwrap();
        assert_eq!(decoded.score.title, "Song");
        assert_eq!(decoded.score.tracks.len(), 1);
        assert_eq!(decoded.score.tracks[0].name, "Pad");
        assert!(decoded.score.tracks[0].is_empty());
    }

    #[test]
    fn pedals_fold_from_sustain_controller() {
        let body = [
            0x00, 0xB0, 0x40, 0x7F, //
            0x60, 0xB0, 0x40, 0x00, //
            0x00, 0xB0, 0x40, 0x7F, // never released
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let bytes = with_track(header(0, 1, 96), &body);
        let decoded = decode_default(&bytes).unwrap();
        let track = &decoded.score.tracks[0];
        assert_eq!(track.pedals.len(), 1);
        assert_eq!(track.pedals[0].duration, 0x60);
        assert!(track.controls.is_empty());
        assert_eq!(decoded.report.unmatched_pedals, 1);

        let kept = decode(&bytes, &ParseOptions { derive_pedals: false }).unwrap();
        assert_eq!(kept.score.tracks[0].controls.len(), 3);
        assert!(kept.score.tracks[0].pedals.is_empty());
    }
}
