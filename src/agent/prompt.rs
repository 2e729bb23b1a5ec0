//! Instruction text for the fraud detector.

const ROLE: &str = "You are an agent that is an expert at detecting fraud in financial transactions. \
You will be given JSON records for credit card transactions where you are trying to determine \
the likelihood of fraud.";

const INDICATORS: &[&str] = &[
    "A sequence of transactions for the same credit card using IP addresses from different countries.",
    "A sequence of transactions where the first is a small amount of money to a charity and then a large amount of money to a store.",
    "Anything else you can find as an expert in fraud detection using resources available to you on the web.",
];

const SAMPLE_INPUT: &str = r#"{"credit_card_number": "1234567812345678", "receiver": "Macy's", "amount": 100.05, "ip_address": "68.45.25.58", "timestamp":"2025-09-18T11:47:02.814"}"#;

const SAMPLE_OUTPUT: &str = r#"{"credit_card_number": "1234567812345678", "receiver": "Macy's", "amount": 100.05, "ip_address": "68.45.25.58", "timestamp":"2025-09-18T11:47:02.814", "fraud_likelihood": 0.2, "fraud_reason": "Multiple transactions from different countries"}"#;

/// Inputs that vary between deployments.
#[derive(Debug, Clone)]
pub struct InstructionParams<'a> {
    pub records_topic: &'a str,
    pub alerts_topic: &'a str,
    pub alert_threshold: f64,
    pub publish_tool: &'a str,
}

/// Render the full agent instruction.
pub fn render_instruction(params: &InstructionParams<'_>) -> String {
    let tool = params.publish_tool;
    let indicators: String = INDICATORS
        .iter()
        .map(|indicator| format!("- {indicator}\n"))
        .collect();

    format!(
        "{ROLE} Possible indicators of fraud:\n\
{indicators}\n\
For each transaction:\n\
1. Evaluate the likelihood of it being a fraudulent transaction and give it a score between 0.0 and 1.0.\n\
2. Augment the input with two new fields: 'fraud_likelihood' set to the result of this evaluation \
and 'fraud_reason' with a short description of the reason for the fraud likelihood.\n\
3. Use \"{tool}\" to publish this augmented JSON object to the topic {records}\n\
4. If the evaluation of fraud from step 1 is > {threshold}, use \"{tool}\" to publish a JSON object containing \
the timestamp, credit card number, fraud likelihood, and fraud likelihood reason to the topic {alerts}.\n\
5. Return the augmented input from step #3.\n\
\n\
Sample input: {SAMPLE_INPUT}\n\
Sample output: {SAMPLE_OUTPUT}\n",
        records = params.records_topic,
        threshold = params.alert_threshold,
        alerts = params.alerts_topic,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> InstructionParams<'static> {
        InstructionParams {
            records_topic: "projects/acme/topics/scored",
            alerts_topic: "projects/acme/topics/alerts",
            alert_threshold: 0.8,
            publish_tool: "publish_record",
        }
    }

    #[test]
    fn instruction_names_topics_threshold_and_tool() {
        let text = render_instruction(&params());
        assert!(text.contains(
            "Use \"publish_record\" to publish this augmented JSON object to the topic projects/acme/topics/scored"
        ));
        assert!(text.contains("is > 0.8, use \"publish_record\""));
        assert!(text.contains("to the topic projects/acme/topics/alerts."));
    }

    #[test]
    fn instruction_lists_every_indicator_and_samples() {
        let text = render_instruction(&params());
        for indicator in INDICATORS {
            assert!(text.contains(indicator));
        }
        assert!(text.contains("\"fraud_likelihood\": 0.2"));
        assert!(text.starts_with("You are an agent"));
    }

    #[test]
    fn custom_threshold_is_rendered() {
        let text = render_instruction(&InstructionParams {
            alert_threshold: 0.65,
            ..params()
        });
        assert!(text.contains("is > 0.65,"));
    }

    #[test]
    fn instruction_keeps_one_step_per_line() {
        let text = render_instruction(&params());
        let lines: Vec<&str> = text.lines().collect();
        for step in 1..=5 {
            assert_eq!(
                lines.iter().filter(|l| l.starts_with(&format!("{step}. "))).count(),
                1
            );
        }
        assert!(lines.contains(&"- A sequence of transactions for the same credit card using IP addresses from different countries."));
        assert!(lines.contains(&"For each transaction:"));
        assert!(lines[lines.len() - 1].starts_with("Sample output: "));
    }
}
