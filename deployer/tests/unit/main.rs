
mod test_fsm;
mod test_monitor;
mod test_pipeline;
mod test_registry;
mod test_services;
mod test_tunnel;
mod test_worker;
