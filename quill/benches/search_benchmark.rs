use criterion::{criterion_group, criterion_main, Criterion};
use quill::config::FuzzyConfig;
use quill::highlight::highlight;
use quill::ranking::MatchOptions;
use quill::search::fuzzy_rank;
use quill::{HighlightItem, SearchResult};
use tokio_util::sync::CancellationToken;

const WORDS: &[&str] = &[
    "ownership", "borrow", "lifetime", "trait", "closure", "iterator", "async", "future", "pinning",
    "macro", "generic", "module", "crate", "cargo", "unsafe", "pointer", "slice", "vector", "hashmap",
    "channel", "mutex", "thread", "runtime", "tokio", "serde", "parser", "lexer", "compiler",
];

/// Deterministic pseudo-random corpus of short titles and longer bodies
fn corpus(size: usize) -> (Vec<SearchResult>, Vec<SearchResult>) {
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        WORDS[(seed % WORDS.len() as u64) as usize]
    };

    let titles = (0..size as i64)
        .map(|id| SearchResult::vocabulary(id, format!("{} {}", next(), next()), Some(next().to_string())))
        .collect();
    let bodies = (0..size as i64)
        .map(|id| {
            let body: Vec<&str> = (0..60).map(|_| next()).collect();
            SearchResult::article(id, format!("Note {}", id), body.join(" "))
        })
        .collect();
    (titles, bodies)
}

fn bench_fuzzy_rank(c: &mut Criterion) {
    let config = FuzzyConfig::default();
    let (titles, bodies) = corpus(5_000);
    let token = CancellationToken::new();

    let queries = vec![("exact_word", "closure"), ("typo", "iteratr"), ("short", "mu"), ("two_words", "borrow trait")];

    let mut group = c.benchmark_group("fuzzy_rank");
    group.sample_size(20);

    for (name, query) in &queries {
        group.bench_function(format!("titles/{}", name), |b| {
            b.iter(|| fuzzy_rank(titles.clone(), query, &MatchOptions::titles(&config), &config.weights, &token))
        });
    }
    for (name, query) in &queries {
        group.bench_function(format!("articles/{}", name), |b| {
            b.iter(|| fuzzy_rank(bodies.clone(), query, &MatchOptions::articles(&config), &config.weights, &token))
        });
    }
    group.finish();
}

fn bench_highlight(c: &mut Criterion) {
    let items: Vec<HighlightItem> = WORDS
        .iter()
        .enumerate()
        .map(|(id, w)| HighlightItem { id: id as i64, title: w.to_string(), original_title: w.to_string() })
        .collect();
    let text = WORDS.repeat(40).join(" ");

    c.bench_function("highlight/vocabulary", |b| b.iter(|| highlight(&text, &items)));
}

criterion_group!(benches, bench_fuzzy_rank, bench_highlight);
criterion_main!(benches);
