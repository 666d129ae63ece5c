pub mod locker;
pub mod parcel;
pub mod user;
