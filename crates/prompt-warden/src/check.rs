use anyhow::Result;
use tokio_util::sync::CancellationToken;

use detect_engine::{DetectionEngine, DetectionResult};

/// Run one detection and print the verdict. Returns the process exit code:
/// 0 for safe input, 1 for unsafe.
pub async fn run(engine: &DetectionEngine, input: &str, json: bool) -> Result<i32> {
    let result = engine.detect(input, &CancellationToken::new()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_report(input, &result);
    }

    Ok(if result.safe { 0 } else { 1 })
}

fn print_report(input: &str, result: &DetectionResult) {
    let verdict = if result.safe { "SAFE" } else { "UNSAFE" };
    println!("Input:      {input}");
    println!(
        "Verdict:    {verdict} (risk {:.2}, confidence {:.2})",
        result.risk_score, result.confidence
    );

    if result.detected_patterns.is_empty() {
        println!("Patterns:   none");
    } else {
        println!("Patterns:");
        for pattern in &result.detected_patterns {
            println!("  - {} ({:.2})", pattern.kind, pattern.score);
            for m in &pattern.matches {
                println!("      {m}");
            }
        }
    }

    if let Some(llm) = &result.llm_result {
        println!(
            "LLM judge:  attack={} confidence={:.2} type={}",
            llm.is_attack, llm.confidence, llm.attack_type
        );
        if !llm.reasoning.is_empty() {
            println!("            {}", llm.reasoning);
        }
    }
}
