use criterion::{black_box, criterion_group, criterion_main, Criterion};

use saiten_core::model::{Constraints, Problem};
use saiten_core::rules::RuleEvaluator;
use saiten_core::similarity::similarity;

fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");

    let short_a = "利用部門の主要メンバを早期に参画させ、要件の合意形成を図る。";
    let short_b = "主要な利用者を初期から参加させ、要件の合意を早めに得る。";

    let context = "A社は基幹システムの刷新プロジェクトを開始した。".repeat(200);
    let answer = "プロジェクトの刷新に向けて利用部門を巻き込む。".repeat(5);

    group.bench_function("short_answer", |b| {
        b.iter(|| similarity(black_box(short_a), black_box(short_b)))
    });

    group.bench_function("answer_vs_long_context", |b| {
        b.iter(|| similarity(black_box(&answer), black_box(&context)))
    });

    group.bench_function("identical", |b| {
        b.iter(|| similarity(black_box(short_a), black_box(short_a)))
    });

    group.finish();
}

fn bench_rule_pass(c: &mut Criterion) {
    let problem = Problem {
        id: "bench".into(),
        year: "2023".into(),
        question_group: "午後I 問1".into(),
        question_number: "設問1".into(),
        context: "A社は基幹システムの刷新プロジェクトを開始した。".repeat(50),
        prompt: "要件定義の段階で実施すべき対策を述べよ。".into(),
        model_answer: "利用部門の主要メンバを早期に参画させ、要件の合意形成を図る。".into(),
        intent: "ステークホルダの巻き込みを理解しているかを問う。".into(),
        constraints: Constraints { char_limit: 40 },
    };
    let evaluator = RuleEvaluator::new();

    c.bench_function("rule_pass/clean_answer", |b| {
        b.iter(|| {
            evaluator.evaluate(
                black_box("主要な利用者を初期から参加させ、要件の合意を早めに得る。"),
                black_box(&problem),
            )
        })
    });
}

criterion_group!(benches, bench_similarity, bench_rule_pass);
criterion_main!(benches);
