//! Client for the users and orders services.

pub mod client;

pub use client::{
    NewOrder, NewUser, Order, OrdersClient, SdkError, ServiceHealth, User, UsersClient,
};
