//! Built-in description of the BikeStores sample database
//!
//! Table names are flattened with underscores (`production_products`, not
//! `production.products`). The translation prompts teach the model this
//! convention, so it must hold for any replacement description as well.

use crate::{ColumnDescriptor as Col, ForeignKey as Fk, SchemaDescription, TableDescriptor as Table};

pub fn bike_stores() -> SchemaDescription {
    let tables = vec![
        Table::new("production_brands", "Contains bicycle brand information")
            .column(Col::new("brand_id", "INT").primary_key().note("Unique identifier for each brand"))
            .column(Col::new("brand_name", "VARCHAR").not_null().note("Name of the bicycle brand")),
        Table::new("production_categories", "Contains bicycle category classifications")
            .column(Col::new("category_id", "INT").primary_key().note("Unique identifier for each category"))
            .column(
                Col::new("category_name", "VARCHAR")
                    .not_null()
                    .note("Name of the bicycle category (e.g., Mountain, Road, etc.)"),
            ),
        Table::new("production_products", "Contains information about bicycle products")
            .column(Col::new("product_id", "INT").primary_key().note("Unique identifier for each product"))
            .column(Col::new("product_name", "VARCHAR").not_null().note("Name of the bicycle product"))
            .column(Col::new("brand_id", "INT").not_null().note("Foreign key referencing production_brands.brand_id"))
            .column(
                Col::new("category_id", "INT")
                    .not_null()
                    .note("Foreign key referencing production_categories.category_id"),
            )
            .column(Col::new("model_year", "SMALLINT").not_null().note("Year the product model was introduced"))
            .column(Col::new("list_price", "DECIMAL").not_null().note("Standard list price of the product"))
            .foreign_key(Fk::new("brand_id", "production_brands", "brand_id"))
            .foreign_key(Fk::new("category_id", "production_categories", "category_id")),
        Table::new("sales_customers", "Contains customer information")
            .column(Col::new("customer_id", "INT").primary_key().note("Unique identifier for each customer"))
            .column(Col::new("first_name", "VARCHAR").not_null().note("Customer's first name"))
            .column(Col::new("last_name", "VARCHAR").not_null().note("Customer's last name"))
            .column(Col::new("phone", "VARCHAR").note("Customer's phone number"))
            .column(Col::new("email", "VARCHAR").not_null().note("Customer's email address"))
            .column(Col::new("street", "VARCHAR").note("Customer's street address"))
            .column(Col::new("city", "VARCHAR").note("Customer's city"))
            .column(Col::new("state", "VARCHAR").note("Customer's state"))
            .column(Col::new("zip_code", "VARCHAR").note("Customer's zip code")),
        Table::new("sales_stores", "Contains store location information")
            .column(Col::new("store_id", "INT").primary_key().note("Unique identifier for each store"))
            .column(Col::new("store_name", "VARCHAR").not_null().note("Name of the store"))
            .column(Col::new("phone", "VARCHAR").note("Store's phone number"))
            .column(Col::new("email", "VARCHAR").note("Store's email address"))
            .column(Col::new("street", "VARCHAR").note("Store's street address"))
            .column(Col::new("city", "VARCHAR").note("Store's city"))
            .column(Col::new("state", "VARCHAR").note("Store's state"))
            .column(Col::new("zip_code", "VARCHAR").note("Store's zip code")),
        Table::new("sales_staffs", "Contains staff information for each store")
            .column(Col::new("staff_id", "INT").primary_key().note("Unique identifier for each staff member"))
            .column(Col::new("first_name", "VARCHAR").not_null().note("Staff's first name"))
            .column(Col::new("last_name", "VARCHAR").not_null().note("Staff's last name"))
            .column(Col::new("email", "VARCHAR").not_null().note("Staff's email address"))
            .column(Col::new("phone", "VARCHAR").note("Staff's phone number"))
            .column(
                Col::new("active", "TINYINT")
                    .not_null()
                    .note("Flag indicating if staff is active (1) or not (0)"),
            )
            .column(Col::new("store_id", "INT").not_null().note("Foreign key referencing sales_stores.store_id"))
            .column(Col::new("manager_id", "INT").note("Foreign key referencing sales_staffs.staff_id for manager"))
            .foreign_key(Fk::new("store_id", "sales_stores", "store_id"))
            .foreign_key(Fk::new("manager_id", "sales_staffs", "staff_id")),
        Table::new("sales_orders", "Contains customer order information")
            .column(Col::new("order_id", "INT").primary_key().note("Unique identifier for each order"))
            .column(Col::new("customer_id", "INT").note("Foreign key referencing sales_customers.customer_id"))
            .column(
                Col::new("order_status", "TINYINT")
                    .not_null()
                    .note("Order status: 1=Pending, 2=Processing, 3=Rejected, 4=Completed"),
            )
            .column(Col::new("order_date", "DATE").not_null().note("Date the order was placed"))
            .column(
                Col::new("required_date", "DATE")
                    .not_null()
                    .note("Date the customer requested the order to be delivered"),
            )
            .column(Col::new("shipped_date", "DATE").note("Date the order was shipped (NULL if not shipped yet)"))
            .column(
                Col::new("store_id", "INT")
                    .not_null()
                    .note("Foreign key referencing sales_stores.store_id where order was placed"),
            )
            .column(
                Col::new("staff_id", "INT")
                    .not_null()
                    .note("Foreign key referencing sales_staffs.staff_id who made the sale"),
            )
            .foreign_key(Fk::new("customer_id", "sales_customers", "customer_id"))
            .foreign_key(Fk::new("store_id", "sales_stores", "store_id"))
            .foreign_key(Fk::new("staff_id", "sales_staffs", "staff_id")),
        Table::new("sales_order_items", "Contains line items for each order")
            .column(
                Col::new("order_id", "INT")
                    .composite_key()
                    .note("Part of composite primary key, foreign key referencing sales_orders.order_id"),
            )
            .column(
                Col::new("item_id", "INT")
                    .composite_key()
                    .note("Part of composite primary key, represents the line number in the order"),
            )
            .column(
                Col::new("product_id", "INT")
                    .not_null()
                    .note("Foreign key referencing production_products.product_id"),
            )
            .column(Col::new("quantity", "INT").not_null().note("Quantity of the product ordered"))
            .column(Col::new("list_price", "DECIMAL").not_null().note("Price of the product at the time of order"))
            .column(
                Col::new("discount", "DECIMAL")
                    .not_null()
                    .note("Discount applied to the product (percentage)"),
            )
            .foreign_key(Fk::new("order_id", "sales_orders", "order_id"))
            .foreign_key(Fk::new("product_id", "production_products", "product_id")),
        Table::new("production_stocks", "Contains inventory information")
            .column(
                Col::new("store_id", "INT")
                    .composite_key()
                    .note("Part of composite primary key, foreign key referencing sales_stores.store_id"),
            )
            .column(
                Col::new("product_id", "INT")
                    .composite_key()
                    .note("Part of composite primary key, foreign key referencing production_products.product_id"),
            )
            .column(Col::new("quantity", "INT").note("Current quantity in stock at the specified store"))
            .foreign_key(Fk::new("store_id", "sales_stores", "store_id"))
            .foreign_key(Fk::new("product_id", "production_products", "product_id")),
    ];

    let mut schema = SchemaDescription::new("BikeStores", tables);
    schema.relationships = [
        "Customers make Orders",
        "Orders contain Order Items",
        "Order Items reference Products",
        "Products belong to Brands and Categories",
        "Stores have Staff members",
        "Stores maintain Stock of Products",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bike_stores_has_nine_flattened_tables() {
        let schema = bike_stores();
        assert_eq!(schema.tables.len(), 9);
        for table in &schema.tables {
            assert!(!table.name.contains('.'), "{} is schema-qualified", table.name);
        }
    }

    #[test]
    fn test_foreign_keys_point_at_known_columns() {
        let schema = bike_stores();
        for table in &schema.tables {
            for fk in &table.foreign_keys {
                assert!(table.columns.iter().any(|c| c.name == fk.column));
                let target = schema
                    .table(&fk.references_table)
                    .unwrap_or_else(|| panic!("missing table {}", fk.references_table));
                assert!(target.columns.iter().any(|c| c.name == fk.references_column));
            }
        }
    }

    #[test]
    fn test_order_items_render_composite_key() {
        let text = bike_stores().to_prompt_text();
        assert!(text.contains("Table: sales_order_items"));
        assert!(text.contains("Primary Key: (order_id, item_id)"));
        assert!(text.contains("order_status (TINYINT) NOT NULL: Order status: 1=Pending"));
    }
}
