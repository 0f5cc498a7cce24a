//! Order fixtures shared by the integration tests

#![allow(dead_code)]

use order_fulfillment::models::order::Address;
use order_fulfillment::models::request::{CreateOrderItem, CreateOrderRequest};

pub fn shipping_address() -> Address {
    Address {
        street: "742 Evergreen Terrace".to_string(),
        city: "Springfield".to_string(),
        state: "OR".to_string(),
        postal_code: "97403".to_string(),
        country: "US".to_string(),
    }
}

/// Two lines totalling 150.00, paid by credit card.
pub fn standard_order() -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id: "cust-1001".to_string(),
        customer_email: "homer@example.com".to_string(),
        items: vec![
            CreateOrderItem {
                product_id: "sku-donut".to_string(),
                product_name: "Donut box".to_string(),
                quantity: 2,
                unit_price: 25.0,
            },
            CreateOrderItem {
                product_id: "sku-lamp".to_string(),
                product_name: "Desk lamp".to_string(),
                quantity: 1,
                unit_price: 100.0,
            },
        ],
        shipping_address: shipping_address(),
        payment_method: "credit_card".to_string(),
        notes: Some("leave at the door".to_string()),
    }
}

pub fn order_for(customer_id: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id: customer_id.to_string(),
        ..standard_order()
    }
}
