// src/spaceship.rs
//! This star has spaceship powers.

/// Print the spaceship.
pub fn print() {
    print!(
        "\x1b[1;34m           /\\\x1b[0m\n\
         \x1b[1;36m          /  \\\x1b[0m\n\
         \x1b[1;37m         /____\\\x1b[0m\n\
         \x1b[1;35m        /\\    /\\\x1b[0m\n\
         \x1b[1;37m       /  \\  /  \\\x1b[0m\n\
         \x1b[1;36m      /____\\/____\\\x1b[0m\n\
         \x1b[1;34m     /======[ ]======\\\x1b[0m\n\
         \x1b[1;36m    ||  ___ [ ] ___  ||\x1b[0m\n\
         \x1b[1;37m    || |___|| ||___| ||\x1b[0m\n\
         \x1b[1;35m    /__|         |__\\\x1b[0m\n\
         \x1b[1;37m   /   \\_________/   \\\x1b[0m\n\
         \x1b[1;36m  /___________________\\\x1b[0m\n\
         \x1b[1;34m      /_|       |_\\\x1b[0m\n\
         \x1b[1;36m     /__|       |__\\\x1b[0m\n"
    );
}
