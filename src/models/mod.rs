pub mod option;
pub mod reference;
