use sales_share_pipeline::*;
use std::error::Error;

const SAMPLE_EXPORT: &str = "\
Time,Category level 1,Price before discount [EUR],Discount value [EUR],Unit cost [EUR],Units sold,Wasted units
2024-03-04 08:12:00,fruit & veg,2.49,0.25,1.10,42,3
2024-03-04 09:40:00,bakery,3.10,0,1.25,18,4
2024-03-05 11:05:00,dairy,1.35,0,0.70,60,1
2024-03-06 16:20:00,drinks,1.95,0.40,0.80,35,0
2024-03-08 10:00:00,frozen,4.20,0,2.30,12,0
2024-03-09 12:30:00,fruit & veg,2.49,0,1.10,51,6
2024-03-11 08:15:00,bakery,3.10,0.30,1.25,22,2
2024-03-12 14:45:00,dairy,1.35,0.10,0.70,48,0
2024-03-13 09:05:00,household,5.60,0,3.10,8,0
2024-03-14 17:10:00,drinks,1.95,0,0.80,44,1
2024-03-16 11:50:00,frozen,4.20,0.50,2.30,15,1
2024-03-17 10:25:00,fruit & veg,2.49,0,1.10,39,2
2024-03-19 08:30:00,bakery,3.10,0,1.25,25,5
2024-03-20 13:00:00,household,5.60,0.60,3.10,11,0
2024-03-22 15:35:00,dairy,1.35,0,0.70,55,2
2024-03-23 09:45:00,drinks,1.95,0,0.80,30,0
2024-03-24 18:05:00,save me,0,0,0,0,0
";

fn main() -> std::result::Result<(), Box<dyn Error>> {
    println!("🛒 Weekly Category Share Demo\n");

    let raw = match std::env::args().nth(1) {
        Some(path) => {
            println!("Reading export from {}", path);
            read_raw_records_from_path(path)?
        }
        None => {
            println!("No path given, using the built-in sample export");
            read_raw_records(SAMPLE_EXPORT.as_bytes())?
        }
    };

    let types = ColumnTypes::new()
        .with("time", ColumnKind::Timestamp)
        .with("category_level_1", ColumnKind::Text)
        .with("price_before_discount", ColumnKind::Numeric)
        .with("discount_value", ColumnKind::Numeric)
        .with("unit_cost", ColumnKind::Numeric)
        .with("units_sold", ColumnKind::Numeric)
        .with("wasted_units", ColumnKind::Numeric);
    let config = PipelineConfig::retail(types, "time", &RetailColumns::default());

    let dataset = process_records(&config, &raw)?.exclude_value("category_level_1", "Save me")?;
    println!(
        "✅ {} rows cleaned, {} columns: {}\n",
        dataset.len(),
        dataset.columns().len(),
        dataset.columns().join(", ")
    );

    let request = ChartRequest::new(
        "category_level_1",
        &[REVENUE_AFTER_DISCOUNT, PROFIT_AFTER_WASTE],
        "Revenue",
    );

    for show_by in [ShowBy::Percentage, ShowBy::Absolute] {
        let chart = weekly_chart(&dataset, &request.clone().show_by(show_by))?;

        println!(
            "📊 {:?} view: {} categories on a {}x{} grid",
            show_by,
            chart.ranked.len(),
            chart.layout.rows,
            chart.layout.columns
        );
        for entry in chart.ranked.entries() {
            println!("  {:<12} {:>10.2}", entry.category, entry.statistic);
        }

        for panel in &chart.panels {
            println!("\n  {}", panel.title);
            for line in &panel.lines {
                let values: Vec<String> = line
                    .points
                    .iter()
                    .map(|p| format!("w{}={:.1}", p.iso_week, p.value))
                    .collect();
                println!("    {:<28} {}", line.label, values.join("  "));
            }
        }
        println!();
    }

    Ok(())
}
