pub mod binder;
pub mod cache;
pub mod catalog;
pub mod collection;
pub mod index;
pub mod pokeapi;
pub mod preload;
pub mod scheduler;
pub mod share;
pub mod window;
