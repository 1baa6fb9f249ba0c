mod handshake_steps;
mod messaging_steps;
