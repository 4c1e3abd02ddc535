//! The shipped demo document must stay valid.

use songhelix_spec::arrangement::ConstraintMode;
use songhelix_spec::player::PlayerSpec;
use songhelix_spec::song::SongDocument;

const EXAMPLE: &str = include_str!("../../../demos/example-song.json");

#[test]
fn demo_document_parses_and_validates() {
    let document = SongDocument::from_str(EXAMPLE).unwrap();
    assert_eq!(document.arrangement.constraint_mode, ConstraintMode::Exact);
    assert_eq!(document.arrangement.activity_vectors.len(), 6);
    assert_eq!(document.arrangement.tracks.len(), 5);
    let PlayerSpec::Midi(midi) = &document.player;
    assert_eq!(midi.devices.len(), 1);
    assert_eq!(midi.instruments.len(), 5);
    assert_eq!(midi.lfos.len(), 1);
}
