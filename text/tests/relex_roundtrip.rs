//! Incremental relexing must always agree with a fresh scan of the whole text.

use rand::{rngs::StdRng, Rng, SeedableRng};
use tether_text::{
    pool::ScratchPool,
    syntax::{tokenize, CLikeTokenizer, Chunk, Scan, Tokenizer},
    Document, RelexSettings, Settings,
};

const FRAGMENTS: &[&str] = &[
    "a", "bc", " ", "\n", "/*", "*/", "//", "\"", "12", ";", "x = 1;\n", "/* note */",
];

fn settings(seed: u64) -> Settings {
    Settings {
        relex: RelexSettings {
            checkpoint_interval: 1 + (seed as usize % 4),
            min_checkpoint_distance: 1 + (seed as usize % 3),
            max_checkpoint_distance: 40,
            chunk_size: 8,
        },
        ..Settings::default()
    }
}

fn random_text(rng: &mut StdRng, fragments: usize) -> String {
    (0..fragments)
        .map(|_| FRAGMENTS[rng.gen_range(0..FRAGMENTS.len())])
        .collect()
}

#[test]
fn incremental_tokens_match_a_fresh_scan() {
    tether_log::test();
    for seed in 0..12 {
        let mut rng = StdRng::seed_from_u64(seed);
        let settings = settings(seed);
        let doc = Document::new(&random_text(&mut rng, 30), CLikeTokenizer::default(), &settings);

        for round in 0..60 {
            let mut section = doc.atomic();
            for _ in 0..rng.gen_range(1..=3) {
                let len = section.len();
                let offset = rng.gen_range(0..=len);
                let removed = rng.gen_range(0..=(len - offset).min(6));
                let fragments = rng.gen_range(0..=2);
                let inserted = random_text(&mut rng, fragments);
                section.edit(offset, removed, &inserted).unwrap();
            }
            section.commit();

            assert!(doc.atomic().commit().is_idle(), "seed {seed} round {round}");

            let read = doc.read();
            let len = read.len();
            let incremental = read.tokens(0..len).unwrap();
            let fresh = tokenize(
                read.text(),
                &mut CLikeTokenizer::default(),
                settings.relex.chunk_size,
                &mut ScratchPool::new(1),
            );
            assert_eq!(incremental, fresh, "seed {seed} round {round}: {}", read.text());

            let checkpoints: Vec<_> = read.checkpoints().iter().collect();
            assert!(
                checkpoints.windows(2).all(|pair| pair[0].0 < pair[1].0),
                "seed {seed} round {round}: {checkpoints:?}"
            );
            let last = checkpoints.last().expect("a terminal checkpoint");
            assert_eq!(last.0, len);
            assert!(last.1.terminal);
        }
    }
}

#[test]
fn token_queries_cover_partial_ranges() {
    tether_log::test();
    let doc = Document::new("int a; /* b */ int c;", CLikeTokenizer::default(), &settings(0));
    let read = doc.read();

    let tokens = read.tokens(7..9).unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].range, 7..14);

    let tokens = read.tokens(0..read.len()).unwrap();
    assert_eq!(tokens.first().map(|token| token.range.start), Some(0));
    assert_eq!(tokens.last().map(|token| token.range.end), Some(read.len()));
    assert!(read.tokens(0..read.len() + 1).is_err());
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WordKind {
    LineStart,
    Word,
    Other,
}

/// Words are classified by the character before them, which may lie before
/// the resume point.
#[derive(Clone, Debug, Default)]
struct LineStartTokenizer {
    cursor: usize,
}

impl Tokenizer for LineStartTokenizer {
    type Kind = WordKind;
    type State = ();

    fn initial_state(&self) -> Self::State {}

    fn state(&self) -> Self::State {}

    fn set_state(&mut self, _state: Self::State) {}

    fn load(&mut self, chunk: &Chunk<'_>) {
        self.cursor = chunk.resume - chunk.start;
    }

    fn next_token(&mut self, chunk: &Chunk<'_>) -> Scan<WordKind> {
        let text = chunk.text;
        let at = self.cursor;
        let Some(&ch) = text.get(at) else {
            return if chunk.is_last {
                Scan::EndOfText
            } else {
                Scan::EndOfChunk
            };
        };
        if !ch.is_alphabetic() {
            self.cursor = at + 1;
            return Scan::Token {
                kind: WordKind::Other,
                len: 1,
            };
        }

        let end = match text[at..].iter().position(|ch| !ch.is_alphabetic()) {
            Some(len) => at + len,
            None if chunk.is_last => text.len(),
            None => return Scan::EndOfChunk,
        };
        let line_start = chunk.start + at == 0 || (at > 0 && text[at - 1] == '\n');
        let kind = if line_start {
            WordKind::LineStart
        } else {
            WordKind::Word
        };
        self.cursor = end;
        Scan::Token {
            kind,
            len: end - at,
        }
    }

    fn pre_scan(&self) -> usize {
        1
    }
}

#[test]
fn lookback_tokens_match_a_fresh_scan() {
    tether_log::test();
    const PIECES: &[&str] = &["ab", "c", " ", "\n", "\n\n", "word ", "x\ny"];

    for seed in 0..12 {
        let mut rng = StdRng::seed_from_u64(seed);
        let settings = settings(seed);
        let source: String = (0..20)
            .map(|_| PIECES[rng.gen_range(0..PIECES.len())])
            .collect();
        let doc = Document::new(&source, LineStartTokenizer::default(), &settings);

        for round in 0..80 {
            let mut section = doc.atomic();
            let len = section.len();
            let offset = rng.gen_range(0..=len);
            let removed = rng.gen_range(0..=(len - offset).min(3));
            let inserted = PIECES[rng.gen_range(0..PIECES.len())];
            section.edit(offset, removed, inserted).unwrap();
            section.commit();

            let read = doc.read();
            let incremental = read.tokens(0..read.len()).unwrap();
            let fresh = tokenize(
                read.text(),
                &mut LineStartTokenizer::default(),
                settings.relex.chunk_size,
                &mut ScratchPool::new(1),
            );
            assert_eq!(incremental, fresh, "seed {seed} round {round}: {:?}", read.text());
        }
    }
}
