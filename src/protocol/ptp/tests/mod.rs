mod bmc;
mod dispatch;
mod foreign;
mod management;
mod support;
mod time;
mod time_proptest;
mod timer;
