use richstep::editor::{CaretMove, KindSet, Snapshot, decode, encode};
use richstep::{Editor, EditorConfig, PluginHost, export};
use serde_json::{Value, json};
use std::time::{Duration, Instant};

/// Performance benchmark suite for the editor core
///
/// Run with: cargo test --release --bench performance -- --nocapture
///
/// This measures:
/// - Snapshot decoding and encoding
/// - Keystroke commits on growing documents
/// - Undo/redo restores
/// - Shortcut expansion through the plugin host
/// - Export to Markdown and step lines
const SMALL_DOC_BLOCKS: usize = 10;
const MEDIUM_DOC_BLOCKS: usize = 100;
const LARGE_DOC_BLOCKS: usize = 1000;

const ITERATIONS: usize = 100;

const SAMPLE_WORDS: [&str; 16] = [
    "whisk", "the", "eggs", "with", "sugar", "until", "pale", "then", "fold", "in", "sifted",
    "flour", "and", "bake", "for", "forty",
];

fn sentence(words: usize, seed: usize) -> String {
    (0..words)
        .map(|j| SAMPLE_WORDS[(seed + j) % SAMPLE_WORDS.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

fn text(value: &str, format: u32) -> Value {
    json!({"type": "text", "text": value, "format": format})
}

/// A snapshot with the given number of top-level blocks, cycling through
/// every block kind.
fn create_test_snapshot(num_blocks: usize, avg_words_per_block: usize) -> Snapshot {
    let children: Vec<Value> = (0..num_blocks)
        .map(|i| {
            let words = sentence(avg_words_per_block, i);
            match i % 6 {
                0 => json!({"type": "heading", "tag": "h2", "children": [text(&words, 0)]}),
                1 => json!({"type": "horizontalrule"}),
                2 => json!({"type": "list", "listType": "number", "children": [
                    {"type": "listitem", "children": [text(&words, 0)]},
                    {"type": "listitem", "children": [text(&words, 1)]}
                ]}),
                3 => json!({"type": "paragraph", "children": [
                    text(&words, 0), text(" and stir", 1), text(" gently", 2)
                ]}),
                _ => json!({"type": "paragraph", "children": [text(&words, 0)]}),
            }
        })
        .collect();
    Snapshot::from_value(json!({"root": {"type": "root", "children": children}}))
        .expect("benchmark snapshot is valid")
}

fn editor_for(snapshot: &Snapshot) -> Editor {
    Editor::new(&EditorConfig::default(), Some(snapshot)).expect("benchmark editor")
}

struct BenchmarkResult {
    name: String,
    iterations: usize,
    total_duration: Duration,
    avg_duration: Duration,
    min_duration: Duration,
    max_duration: Duration,
}

impl BenchmarkResult {
    fn print(&self) {
        println!("\n{}", "=".repeat(70));
        println!("Benchmark: {}", self.name);
        println!("{}", "=".repeat(70));
        println!("Iterations:     {}", self.iterations);
        println!("Total time:     {:?}", self.total_duration);
        println!("Average:        {:?}", self.avg_duration);
        println!("Min:            {:?}", self.min_duration);
        println!("Max:            {:?}", self.max_duration);
        println!(
            "Ops/sec:        {:.2}",
            1_000_000.0 / self.avg_duration.as_micros().max(1) as f64
        );

        // A keystroke should commit well within one frame.
        if self.avg_duration.as_millis() > 100 {
            println!("\n⚠️  WARNING: Average duration > 100ms (user-perceptible lag)");
        } else if self.avg_duration.as_millis() > 16 {
            println!("\n⚠️  WARNING: Average duration > 16ms (may drop frames)");
        }
    }
}

fn benchmark<F>(name: &str, iterations: usize, mut f: F) -> BenchmarkResult
where
    F: FnMut(),
{
    let mut durations = Vec::with_capacity(iterations);

    // Warmup
    for _ in 0..10 {
        f();
    }

    for _ in 0..iterations {
        let start = Instant::now();
        f();
        durations.push(start.elapsed());
    }

    let total_duration: Duration = durations.iter().sum();
    let avg_duration = total_duration / iterations as u32;
    let min_duration = *durations.iter().min().unwrap();
    let max_duration = *durations.iter().max().unwrap();

    BenchmarkResult {
        name: name.to_string(),
        iterations,
        total_duration,
        avg_duration,
        min_duration,
        max_duration,
    }
}

fn sizes() -> Vec<(&'static str, usize)> {
    vec![
        ("small", SMALL_DOC_BLOCKS),
        ("medium", MEDIUM_DOC_BLOCKS),
        ("large", LARGE_DOC_BLOCKS),
    ]
}

#[test]
fn bench_snapshot_codec() {
    println!("\n\n╔════════════════════════════════════════════════════════════════╗");
    println!("║               SNAPSHOT CODEC BENCHMARKS                        ║");
    println!("╚════════════════════════════════════════════════════════════════╝");

    let kinds = KindSet::all();
    for (label, blocks) in sizes() {
        let snapshot = create_test_snapshot(blocks, 12);
        let json = snapshot.to_json().unwrap();
        let state = decode(&snapshot, &kinds).unwrap();

        benchmark(&format!("parse + decode ({label}, {blocks} blocks)"), ITERATIONS, || {
            let parsed = Snapshot::from_json(&json).unwrap();
            let _ = decode(&parsed, &kinds).unwrap();
        })
        .print();

        benchmark(&format!("encode + serialize ({label}, {blocks} blocks)"), ITERATIONS, || {
            let _ = encode(&state).to_json().unwrap();
        })
        .print();
    }
}

#[test]
fn bench_typing_commits() {
    println!("\n\n╔════════════════════════════════════════════════════════════════╗");
    println!("║               TYPING COMMIT BENCHMARKS                         ║");
    println!("╚════════════════════════════════════════════════════════════════╝");

    for (label, blocks) in sizes() {
        let snapshot = create_test_snapshot(blocks, 12);
        let mut editor = editor_for(&snapshot);
        editor.move_caret(CaretMove::DocumentEnd, false).unwrap();

        benchmark(&format!("insert char ({label}, {blocks} blocks)"), ITERATIONS, || {
            editor.insert_text("a").unwrap();
        })
        .print();

        benchmark(&format!("backspace ({label}, {blocks} blocks)"), ITERATIONS, || {
            editor.delete_backward().unwrap();
        })
        .print();
    }
}

#[test]
fn bench_structural_commits() {
    let snapshot = create_test_snapshot(MEDIUM_DOC_BLOCKS, 12);
    let mut editor = editor_for(&snapshot);

    benchmark("paragraph break + join (medium)", ITERATIONS, || {
        editor.insert_paragraph_break().unwrap();
        editor.delete_backward().unwrap();
    })
    .print();

    benchmark("horizontal rule (medium)", ITERATIONS, || {
        editor.insert_horizontal_rule().unwrap();
    })
    .print();
}

#[test]
fn bench_undo_redo() {
    let snapshot = create_test_snapshot(LARGE_DOC_BLOCKS, 12);
    let mut editor = editor_for(&snapshot);
    for _ in 0..50 {
        editor.insert_horizontal_rule().unwrap();
    }

    let result = benchmark("undo + redo (large, 50 entries)", ITERATIONS, || {
        editor.undo().unwrap();
        editor.redo().unwrap();
    });
    result.print();
    assert_eq!(editor.history().undo_depth(), 50);
}

#[test]
fn bench_shortcut_expansion() {
    let snapshot = create_test_snapshot(MEDIUM_DOC_BLOCKS, 12);
    let mut host = PluginHost::with_defaults(&EditorConfig::default(), Some(&snapshot), |_| {})
        .expect("benchmark host");
    host.mount();
    host.move_caret(CaretMove::DocumentEnd, false).unwrap();

    benchmark("type '---' and expand (medium)", ITERATIONS, || {
        host.insert_paragraph_break().unwrap();
        for ch in ["-", "-", "-"] {
            host.insert_text(ch).unwrap();
        }
    })
    .print();
}

#[test]
fn bench_export() {
    for (label, blocks) in sizes() {
        let state = editor_for(&create_test_snapshot(blocks, 12)).state();

        benchmark(&format!("markdown export ({label}, {blocks} blocks)"), ITERATIONS, || {
            let _ = export::to_markdown(&state).unwrap();
        })
        .print();

        benchmark(&format!("step lines ({label}, {blocks} blocks)"), ITERATIONS, || {
            let _ = export::step_lines(&state);
        })
        .print();
    }
}
