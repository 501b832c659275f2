use pretty_assertions::assert_eq;
use symscore::{
    parse_with, serialize, DecodeReport, KeyMode, KeySignature, Note, ParseOptions, Quarter,
    Score, Tick, Track,
};

#[test]
fn score_json_shape() {
    let mut score = Score::<Quarter>::new(96).unwrap();
    score
        .key_signatures
        .push(KeySignature::new(0.0, -2, KeyMode::Minor).unwrap());
    let mut track = Track::new("Oboe", 68, false).unwrap();
    track.notes.push(Note::new(1.5, 0.5, 70, 88).unwrap());
    score.tracks.push(track);

    let value = serde_json::to_value(&score).unwrap();
    assert_eq!(value["ticks_per_quarter"], 96);
    assert_eq!(value["format"], "parallel");
    assert_eq!(value["key_signatures"][0]["mode"], "minor");
    assert_eq!(value["tracks"][0]["notes"][0]["time"], 1.5);
    assert_eq!(value["tracks"][0]["name"], "Oboe");

    let back: Score<Quarter> = serde_json::from_value(value).unwrap();
    assert_eq!(back, score);
}

#[test]
fn tick_times_serialize_as_integers() {
    let mut track = Track::<Tick>::new("", 0, false).unwrap();
    track.notes.push(Note::new(480, 240, 60, 100).unwrap());
    let json = serde_json::to_string(&track.notes[0]).unwrap();
    assert_eq!(
        json,
        r#"{"time":480,"duration":240,"pitch":60,"velocity":100,"channel":0}"#
    );
}

#[test]
fn decode_report_is_serializable() {
    let mut score = Score::<Tick>::new(96).unwrap();
    let mut track = Track::new("", 0, false).unwrap();
    track.notes.push(Note::new(0, 96, 60, 100).unwrap());
    score.tracks.push(track);
    let decoded = parse_with(&serialize(&score).unwrap(), &ParseOptions::default()).unwrap();

    let json = serde_json::to_string(&decoded.report).unwrap();
    let report: DecodeReport = serde_json::from_str(&json).unwrap();
    assert_eq!(report, decoded.report);
    assert!(report.is_clean());
}
