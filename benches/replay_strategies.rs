//! Benchmark suite comparing the replay strategies
//!
//! ```bash
//! cargo bench
//! ```
//!
//! Each run replays a generated command file in which every seller posts an
//! offer and several buyers trade against it, interleaved with deposits and
//! withdrawals from unrelated users. The async strategy can spread the
//! independent trading circles across worker threads.

use divan::Bencher;
use rust_escrow_ledger::cli::StrategyType;
use rust_escrow_ledger::strategy::{create_strategy, BatchConfig, EngineSettings};
use std::io::Write;
use tempfile::NamedTempFile;

fn main() {
    divan::main();
}

const CIRCLES: &[usize] = &[10, 100, 1_000];

/// One offer and four trades per circle, plus a solo user per circle
fn replay_file(circles: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "type,user,ref,target,currency,counter,amount,counter_amount,min,max,detail")
        .expect("header");
    for c in 0..circles {
        let seller = format!("seller-{}", c);
        writeln!(file, "deposit,{},sd{},,BTC,,1,,,,", seller, c).expect("row");
        writeln!(
            file,
            "offer,{},o{},,BTC,BRL,1,100000,100,100000,sell:PIX",
            seller, c
        )
        .expect("row");
        for b in 0..4 {
            let buyer = format!("buyer-{}-{}", c, b);
            let trade = format!("t{}-{}", c, b);
            writeln!(file, "deposit,{},bd{}-{},,BRL,,5000,,,,", buyer, c, b).expect("row");
            writeln!(file, "trade,{},{},o{},,,1000,,,,", buyer, trade, c).expect("row");
            writeln!(file, "confirm,{},,{},,,,,,,", buyer, trade).expect("row");
            writeln!(file, "release,{},,{},,,,,,,", seller, trade).expect("row");
        }
        writeln!(file, "deposit,solo-{},sx{},,BRL,,300,,,,", c, c).expect("row");
        writeln!(file, "withdraw,solo-{},,,BRL,,120,,,,", c).expect("row");
    }
    file.flush().expect("flush");
    file
}

#[divan::bench(args = CIRCLES)]
fn sync_strategy(bencher: Bencher, circles: usize) {
    let input = replay_file(circles);
    let strategy = create_strategy(StrategyType::Sync, None, EngineSettings::default());

    bencher.bench_local(|| {
        let mut output = Vec::new();
        strategy
            .process(input.path(), &mut output)
            .expect("Processing failed");
        output
    });
}

#[divan::bench(args = CIRCLES)]
fn async_strategy(bencher: Bencher, circles: usize) {
    let input = replay_file(circles);
    let strategy = create_strategy(
        StrategyType::Async,
        Some(BatchConfig::default()),
        EngineSettings::default(),
    );

    bencher.bench_local(|| {
        let mut output = Vec::new();
        strategy
            .process(input.path(), &mut output)
            .expect("Processing failed");
        output
    });
}
