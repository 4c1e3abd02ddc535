//! Full-pipeline generation from the shipped demo document.

use songhelix_engine::arrange::generate_song;
use songhelix_engine::sequence::TrackKind;
use songhelix_spec::song::SongDocument;

const EXAMPLE: &str = include_str!("../../../demos/example-song.json");

#[test]
fn demo_document_generates_a_playable_song() {
    let document = SongDocument::from_str(EXAMPLE).unwrap();
    let context = generate_song(&document, Some(7), None).unwrap();

    let total = context.structure.total_ticks() as u64;
    assert!(total > 0);
    assert_eq!(context.harmony.total_ticks() as u64, total);
    context.harmony.check_sanity().unwrap();

    assert_eq!(context.activity_matrix.len(), 6);
    for (name, vector) in context.activity_matrix.vectors() {
        assert_eq!(vector.len() as u64, total, "vector {}", name);
    }

    assert_eq!(context.arrangement.entries().len(), 5);
    for entry in context.arrangement.entries() {
        for sequence in &entry.track.sequences {
            assert_eq!(sequence.total_ticks(), total, "track {}", entry.instrument);
        }
    }
    assert_eq!(
        context.arrangement.get("drums").unwrap().kind,
        TrackKind::Rhythm
    );
    // The drum track renders one sequence per configured voice.
    assert_eq!(context.arrangement.get("drums").unwrap().sequences.len(), 3);
}

#[test]
fn demo_document_is_deterministic_per_seed() {
    let document = SongDocument::from_str(EXAMPLE).unwrap();
    let a = generate_song(&document, Some(11), None).unwrap();
    let b = generate_song(&document, Some(11), None).unwrap();
    assert_eq!(a.arrangement, b.arrangement);
    assert_eq!(a.harmony, b.harmony);
    assert_eq!(a.song_name, b.song_name);
}
