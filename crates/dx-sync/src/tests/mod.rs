mod context;
mod wait;
