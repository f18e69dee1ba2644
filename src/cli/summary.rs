use super::ui;
use crate::core::config::AppConfig;
use crate::core::currency::{CurrencyRateProvider, convert_summary};
use crate::core::ledger::LoadOutcome;
use crate::core::price::Warning;
use crate::core::summary::PortfolioSummary;
use crate::core::valuation::{ValuationReport, run_valuation};
use crate::providers::Providers;
use anyhow::Result;
use comfy_table::Cell;
use tracing::{debug, warn};

const BASE_CURRENCY: &str = "USD";

impl PortfolioSummary {
    pub fn display_as_table(&self, currency: &str) -> String {
        let mut table = ui::new_styled_table();

        table.set_header(vec![
            ui::header_cell("Asset"),
            ui::header_cell("Class"),
            ui::header_cell("Quantity"),
            ui::header_cell(&format!("Avg Cost ({currency})")),
            ui::header_cell(&format!("Price ({currency})")),
            ui::header_cell(&format!("Value ({currency})")),
            ui::header_cell("Realized"),
            ui::header_cell("Unrealized"),
            ui::header_cell("Total P&L"),
            ui::header_cell("Return"),
        ]);

        for entry in self.entries.values() {
            let price = if entry.is_fallback_price {
                Cell::new(format!("{:.2}*", entry.current_price))
                    .fg(comfy_table::Color::Yellow)
                    .set_alignment(comfy_table::CellAlignment::Right)
            } else {
                ui::amount_cell(entry.current_price, 2)
            };

            table.add_row(vec![
                Cell::new(&entry.symbol),
                Cell::new(entry.asset_class.to_string()),
                ui::amount_cell(entry.quantity, 8),
                ui::amount_cell(entry.average_buy_price, 2),
                price,
                ui::amount_cell(entry.current_value, 2),
                ui::pl_cell(entry.realized_pl, format!("{:.2}", entry.realized_pl)),
                ui::pl_cell(entry.unrealized_pl, format!("{:.2}", entry.unrealized_pl)),
                ui::pl_cell(entry.total_pl, format!("{:.2}", entry.total_pl)),
                ui::change_cell(entry.total_pl_percentage),
            ]);
        }

        let totals = self.totals();
        let mut output = format!("{}\n\n", ui::style_text("Portfolio", ui::StyleType::Title));
        output.push_str(&table.to_string());

        if self.entries.values().any(|e| e.is_fallback_price) {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    "* no live price, valued at average cost",
                    ui::StyleType::Subtle
                )
            ));
        }

        output.push_str(&format!(
            "\n\nTotal Value ({}): {}",
            ui::style_text(currency, ui::StyleType::TotalLabel),
            ui::style_text(&format!("{:.2}", totals.current_value), ui::StyleType::TotalValue)
        ));
        output.push_str(&format!(
            "\nInvested: {:.2}  Cost basis: {:.2}  Realized: {:.2}  Unrealized: {:.2}  Total P&L: {:.2}",
            totals.total_invested,
            totals.total_cost_basis,
            totals.realized_pl,
            totals.unrealized_pl,
            totals.total_pl
        ));

        output
    }
}

pub fn display_warnings(warnings: &[Warning]) -> String {
    let mut output = ui::style_text("Warnings", ui::StyleType::TotalLabel);
    for warning in warnings {
        output.push_str(&format!(
            "\n  - {}",
            ui::style_text(warning.message(), ui::StyleType::Warning)
        ));
    }
    output
}

/// Converts the report into `currency`. When no rate is available the report
/// stays in USD and says so.
pub async fn localize(
    report: ValuationReport,
    rates: &dyn CurrencyRateProvider,
    currency: &str,
) -> (ValuationReport, String) {
    if currency.eq_ignore_ascii_case(BASE_CURRENCY) {
        return (report, BASE_CURRENCY.to_string());
    }
    match rates.get_rate(BASE_CURRENCY, currency).await {
        Ok(rate) => {
            debug!(rate, currency, "Converting summary");
            let summary = convert_summary(&report.summary, rate);
            (
                ValuationReport {
                    summary,
                    warnings: report.warnings,
                },
                currency.to_uppercase(),
            )
        }
        Err(e) => {
            warn!(error = %e, currency, "Currency conversion failed");
            let mut warnings = report.warnings;
            warnings.push(Warning::new(format!(
                "Could not convert to {currency} ({e}), showing USD"
            )));
            (
                ValuationReport {
                    summary: report.summary,
                    warnings,
                },
                BASE_CURRENCY.to_string(),
            )
        }
    }
}

pub async fn run(outcome: LoadOutcome, providers: &Providers, config: &AppConfig) -> Result<()> {
    if let Some(e) = &outcome.error {
        println!(
            "{}",
            ui::style_text(
                &format!("Transaction store unavailable ({e}), using local snapshot"),
                ui::StyleType::Warning
            )
        );
    }
    if outcome.transactions.is_empty() {
        println!("No transactions recorded yet. Add one with `pnlfolio add`.");
        return Ok(());
    }

    let pb = ui::new_spinner("Fetching prices...");
    let report = run_valuation(
        &outcome.transactions,
        &providers.aggregator,
        config.zero_cost_return,
    )
    .await;
    let (report, currency) =
        localize(report, providers.rates.as_ref(), &config.display_currency).await;
    pb.finish_and_clear();

    println!("{}", report.summary.display_as_table(&currency));
    if !report.warnings.is_empty() {
        println!("\n{}", display_warnings(&report.warnings));
    }
    Ok(())
}
