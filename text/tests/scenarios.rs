use parking_lot::Mutex;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tether_text::{
    syntax::{CLikeTokenizer, RelexOutcome},
    Bias, BlockRelation, Document, Error, RelexSettings, Settings,
};

fn document(text: &str) -> Document<CLikeTokenizer> {
    Document::new(text, CLikeTokenizer::default(), &Settings::default())
}

#[test]
fn insertion_at_a_mark_follows_its_bias() {
    tether_log::test();
    for (bias, expected) in [(Bias::Right, [0, 6, 11]), (Bias::Left, [0, 5, 11])] {
        let doc = document("0123456789abcdef");
        let mut section = doc.atomic();
        let marks: Vec<_> = [0, 5, 10]
            .into_iter()
            .map(|offset| section.create_mark(offset, bias).unwrap())
            .collect();
        section.insert(5, "x").unwrap();

        let offsets: Vec<_> = marks
            .iter()
            .map(|mark| section.offset_of(*mark).unwrap())
            .collect();
        assert_eq!(offsets, expected, "{bias:?}");
    }
}

#[test]
fn guarded_removal_changes_nothing() {
    tether_log::test();
    let doc = document("0123456789abcdefghijklmnopqrstuvwxyz");
    let mut section = doc.atomic();
    section.add_guarded_range(10..20).unwrap();
    let marks: Vec<_> = [5, 15, 24, 30]
        .into_iter()
        .map(|offset| section.create_mark(offset, Bias::Left).unwrap())
        .collect();

    let err = section.remove(15..25).unwrap_err();
    assert_eq!(
        err,
        Error::GuardViolation {
            start: 15,
            end: 25,
            relation: BlockRelation::OverlapEnd,
            block: 10..20,
        }
    );

    assert_eq!(section.len(), 36);
    let offsets: Vec<_> = marks
        .iter()
        .map(|mark| section.offset_of(*mark).unwrap())
        .collect();
    assert_eq!(offsets, vec![5, 15, 24, 30]);
    assert_eq!(section.guarded_ranges(), vec![10..20]);
}

#[test]
fn comment_edit_reconverges_after_the_comment() {
    tether_log::test();
    let settings = Settings {
        relex: RelexSettings {
            checkpoint_interval: 1,
            min_checkpoint_distance: 1,
            ..RelexSettings::default()
        },
        ..Settings::default()
    };
    let doc = Document::new("ab/*c*/d", CLikeTokenizer::default(), &settings);

    let mut section = doc.atomic();
    section.insert(4, "x").unwrap();
    let report = section.commit();

    assert_eq!(report.outcome, RelexOutcome::Matched { at: 8 });
    assert_eq!(report.rescanned.start, 2);
    assert_eq!(report.tokens_scanned, 1);
    assert_eq!(report.checkpoints_added, 0);

    let report = doc.atomic().commit();
    assert!(report.is_idle());
}

#[test]
fn deletion_notifies_contained_marks_in_order() {
    tether_log::test();
    let doc = document("the quick brown fox jumps");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut section = doc.atomic();

    let mut marks = Vec::new();
    let placements = [
        (16, Bias::Left),
        (4, Bias::Right),
        (10, Bias::Left),
        (20, Bias::Right),
    ];
    for (offset, bias) in placements {
        let mark = section.create_mark(offset, bias).unwrap();
        let seen = Arc::clone(&seen);
        section
            .register_removal_callback(mark, move |notice| seen.lock().push(notice.offset))
            .unwrap();
        marks.push(mark);
    }

    section.remove(4..19).unwrap();
    assert_eq!(*seen.lock(), vec![4, 10, 16]);
    for mark in &marks[..3] {
        assert_eq!(section.offset_of(*mark).unwrap(), 4);
    }
    assert_eq!(section.offset_of(marks[3]).unwrap(), 5);
    assert_eq!(section.text().to_string(), "the  jumps");
}

#[test]
fn removed_marks_report_invalid_mark() {
    tether_log::test();
    let doc = document("hello");
    let mut section = doc.atomic();
    let mark = section.create_mark(2, Bias::Left).unwrap();
    section.remove_mark(mark).unwrap();

    assert!(section.offset_of(mark).unwrap_err().is_invalid_mark());
    assert!(section.remove_mark(mark).unwrap_err().is_invalid_mark());
}

#[test]
fn break_guarded_is_restored_after_a_panic() {
    tether_log::test();
    let doc = document("0123456789abcdefghij");
    doc.atomic().add_guarded_range(5..10).unwrap();

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let mut section = doc.atomic();
        section.set_break_guarded(true);
        section.remove(6..8).unwrap();
        panic!("editor command failed");
    }));
    assert!(result.is_err());

    let read = doc.read();
    assert!(!read.break_guarded());
    assert_eq!(read.len(), 18);
    assert!(read.pending_damage().is_some());
    drop(read);

    let report = doc.atomic().commit();
    assert!(!report.is_idle());
    assert!(doc.read().pending_damage().is_none());
}
