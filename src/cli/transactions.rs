use super::ui;
use crate::core::ledger::Ledger;
use crate::core::transaction::{Transaction, TransactionInput};
use anyhow::{Context, Result};
use comfy_table::Cell;

pub fn display_transactions(transactions: &[Transaction]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Asset"),
        ui::header_cell("Class"),
        ui::header_cell("Type"),
        ui::header_cell("Quantity"),
        ui::header_cell("Unit Price"),
        ui::header_cell("Fee"),
        ui::header_cell("Total"),
        ui::header_cell("Id"),
    ]);

    for tx in transactions {
        table.add_row(vec![
            Cell::new(tx.timestamp.format("%Y-%m-%d %H:%M")),
            Cell::new(&tx.symbol),
            Cell::new(tx.asset_class.to_string()),
            Cell::new(tx.operation.to_string()),
            ui::amount_cell(tx.quantity, 8),
            ui::amount_cell(tx.unit_price, 2),
            ui::amount_cell(tx.fee, 2),
            ui::amount_cell(tx.quantity * tx.unit_price, 2),
            Cell::new(ui::style_text(&tx.id, ui::StyleType::Subtle)),
        ]);
    }
    table.to_string()
}

pub async fn list(ledger: &Ledger) -> Result<()> {
    let outcome = ledger.load_with_fallback().await;
    if let Some(e) = &outcome.error {
        println!(
            "{}",
            ui::style_text(
                &format!("Transaction store unavailable ({e}), showing local snapshot"),
                ui::StyleType::Warning
            )
        );
    }
    if outcome.transactions.is_empty() {
        println!("No transactions recorded yet.");
        return Ok(());
    }
    println!("{}", display_transactions(&outcome.transactions));
    Ok(())
}

pub async fn add(ledger: &Ledger, input: TransactionInput) -> Result<()> {
    let tx = ledger
        .add(input)
        .await
        .context("Failed to add transaction")?;
    println!(
        "Added {} {} {} ({})",
        tx.operation, tx.quantity, tx.symbol, tx.id
    );
    Ok(())
}

pub async fn edit(ledger: &Ledger, id: &str, input: TransactionInput) -> Result<()> {
    let tx = ledger
        .update(id, input)
        .await
        .with_context(|| format!("Failed to update transaction {id}"))?;
    println!("Updated {} ({})", tx.symbol, tx.id);
    Ok(())
}

pub async fn remove(ledger: &Ledger, id: &str) -> Result<()> {
    ledger
        .delete(id)
        .await
        .with_context(|| format!("Failed to remove transaction {id}"))?;
    println!("Removed {id}");
    Ok(())
}

pub async fn sync(ledger: &Ledger) -> Result<()> {
    let added = ledger
        .sync_local_to_owner()
        .await
        .context("Failed to sync local transactions")?;
    match ledger.owner() {
        Some(owner) => println!("Synced {added} local transaction(s) to {owner}"),
        None => println!("Synced {added} local transaction(s)"),
    }
    Ok(())
}
