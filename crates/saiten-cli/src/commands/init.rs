//! The `saiten init` command.

use std::path::Path;

use anyhow::Result;

use saiten_providers::config::STARTER_CONFIG;

pub fn execute() -> Result<()> {
    write_once(Path::new("saiten.toml"), STARTER_CONFIG)?;

    std::fs::create_dir_all("problem-sets")?;
    write_once(Path::new("problem-sets/example.toml"), EXAMPLE_PROBLEM_SET)?;

    println!("\nNext steps:");
    println!("  1. Point saiten.toml at your LM Studio, Ollama or OpenAI endpoint");
    println!("  2. Run: saiten validate --problems problem-sets/example.toml");
    println!(
        "  3. Run: saiten grade --problems problem-sets/example.toml --problem example-1 --answer \"...\""
    );

    Ok(())
}

fn write_once(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const EXAMPLE_PROBLEM_SET: &str = r#"[problem_set]
id = "example"
name = "Example Problem Set"
description = "A single question to get started"
exam = "プロジェクトマネージャ試験"

[[problems]]
id = "example-1"
year = "2023"
question_group = "午後I 問1"
question_number = "設問1"
context = """
A社は基幹システムの刷新プロジェクトを開始した。過去のプロジェクトでは、要件定義の終盤に
利用部門から追加要望が相次ぎ、スケジュールが遅延した。
"""
prompt = "プロジェクトマネージャが要件定義の開始時点で実施すべきことを40字以内で述べよ。"
model_answer = "利用部門の主要メンバを早期に参画させ、要件の合意形成を図る。"
intent = "利害関係者を早期に巻き込み、手戻りを防ぐ考え方の理解を問う。"

[problems.constraints]
char_limit = 40
"#;
