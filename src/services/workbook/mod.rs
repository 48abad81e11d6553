pub mod classifier;
pub mod reader;
pub mod utils;

pub use reader::parse_workbook;
pub use utils::{ensure_within_limit, load_file_from_url};

#[cfg(test)]
pub mod fixtures {
    use bytes::Bytes;
    use rust_xlsxwriter::Workbook;

    /// Orders sheet (one column per bucket), a blank sheet, and a sheet with
    /// repeated and missing headers.
    pub fn sales_workbook() -> Bytes {
        let mut workbook = Workbook::new();

        let orders = workbook.add_worksheet();
        orders.set_name("Orders").unwrap();
        for (col, header) in ["order_id", "region", "amount", "order_date", "feedback"]
            .iter()
            .enumerate()
        {
            orders.write_string(0, col as u16, *header).unwrap();
        }
        let data = [
            (1.0, "North", 120.5, "2024-01-05", "Delivery was quick and the packaging was intact"),
            (2.0, "South", 80.0, "2024-01-06", "Product arrived damaged, support replaced it"),
            (3.0, "North", 200.0, "2024-01-07", "Great value for the price, will order again"),
            (4.0, "East", 45.25, "2024-02-01", "The size chart was misleading for this model"),
            (5.0, "South", 99.9, "2024-02-03", "Fast shipping but the manual is missing pages"),
            (6.0, "North", 150.0, "2024-02-10", "Colour differs slightly from the product photo"),
        ];
        for (i, (id, region, amount, date, feedback)) in data.iter().enumerate() {
            let row = (i + 1) as u32;
            orders.write_number(row, 0, *id).unwrap();
            orders.write_string(row, 1, *region).unwrap();
            orders.write_number(row, 2, *amount).unwrap();
            orders.write_string(row, 3, *date).unwrap();
            orders.write_string(row, 4, *feedback).unwrap();
        }

        let scratch = workbook.add_worksheet();
        scratch.set_name("Scratch").unwrap();

        let targets = workbook.add_worksheet();
        targets.set_name("Targets").unwrap();
        targets.write_string(0, 0, "region").unwrap();
        targets.write_string(0, 1, "region").unwrap();
        targets.write_string(1, 0, "North").unwrap();
        targets.write_string(1, 1, "N").unwrap();
        targets.write_number(1, 2, 500.0).unwrap();
        targets.write_string(2, 0, "South").unwrap();
        targets.write_string(2, 1, "S").unwrap();
        targets.write_number(2, 2, 300.0).unwrap();

        Bytes::from(workbook.save_to_buffer().unwrap())
    }
}
