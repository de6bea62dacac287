pub mod cart;
pub mod cart_item;
pub mod customer;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_variant;

pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use customer::Entity as Customer;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product::Entity as Product;
pub use product_variant::Entity as ProductVariant;

pub type CartModel = cart::Model;
pub type CartItemModel = cart_item::Model;
pub type CustomerModel = customer::Model;
pub type OrderModel = order::Model;
pub type OrderItemModel = order_item::Model;
pub type ProductModel = product::Model;
pub type ProductVariantModel = product_variant::Model;
