//! Screen layouts shown by the gateway

use tg_core::{Host, HostCatalog};
use tg_protocol::{Aid, Color, Field, Highlight, Rules, Screen, Validator, COLS};

pub const USERID: &str = "userid";
pub const PASSWORD: &str = "password";
pub const ERROR: &str = "errormsg";
pub const SELECTION: &str = "selection";

/// Key that ends the login wait without authenticating
pub const LOGOFF_KEY: Aid = Aid::Pf(9);

pub const INVALID_LOGIN: &str = "Invalid userid or password. Please try again.";

/// First menu row holding a host
const FIRST_HOST_ROW: usize = 2;
/// Host rows that fit above the disconnect hint
pub const VISIBLE_HOSTS: usize = 19;

/// Cursor on the USERID field
pub const LOGIN_CURSOR: (usize, usize) = (6, 20);
/// Cursor on the selection field
pub const MENU_CURSOR: (usize, usize) = (23, 37);
pub const NOTICE_CURSOR: (usize, usize) = (5, 1);

/// What a menu entry asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    /// 1-based catalog position
    Host(usize),
    Disconnect,
    /// Anything else; the menu is shown again
    Invalid,
}

/// Interpret the text typed into the selection field
pub fn parse_selection(input: &str, catalog_len: usize) -> MenuChoice {
    let input = input.trim();
    if input == "99" || input.eq_ignore_ascii_case("x") {
        return MenuChoice::Disconnect;
    }
    match input.parse::<usize>() {
        Ok(number) if (1..=catalog_len).contains(&number) => MenuChoice::Host(number),
        _ => MenuChoice::Invalid,
    }
}

pub fn login_screen() -> Screen {
    let dashes = "-".repeat(15);
    vec![
        Field::text(0, 0, format!("{dashes} TN3270 GATEWAY - LOGON {dashes}")).color(Color::White),
        Field::text(2, 0, "PF9 ==> Logoff").color(Color::White),
        Field::text(4, 3, "ENTER LOGON PARAMETERS BELOW:").color(Color::White),
        Field::text(6, 3, "USERID    ").color(Color::Turquoise),
        Field::text(6, 13, "===>").color(Color::White),
        Field::input(6, 19, USERID).color(Color::Red),
        Field::stop(6, 28),
        Field::text(8, 3, "PASSWORD  ").color(Color::Turquoise),
        Field::text(8, 13, "===>").color(Color::White),
        Field::input(8, 19, PASSWORD).hidden().color(Color::Red),
        Field::stop(8, 28),
        Field::output(22, 0, ERROR).color(Color::Red).intense(),
    ]
}

pub fn login_rules() -> Rules {
    Rules::from([
        (USERID.to_string(), Validator::NonBlank),
        (PASSWORD.to_string(), Validator::NonBlank),
    ])
}

/// Numbered host list for a user
pub fn menu_screen(username: &str, catalog: &HostCatalog) -> Screen {
    let welcome = format!("Welcome {} - Available Hosts", username);
    let centre = (COLS.saturating_sub(welcome.len()) / 2).max(1);

    let mut screen = vec![Field::text(0, centre, welcome).color(Color::White)];

    for (index, host) in catalog.hosts().iter().take(VISIBLE_HOSTS).enumerate() {
        let row = FIRST_HOST_ROW + index;
        let name = format!("{:<30}", host.name);
        let name_width = name.len();
        screen.push(Field::text(row, 1, format!("{:2}.", index + 1)).color(Color::White));
        screen.push(Field::text(row, 5, name).color(Color::Blue));
        screen.push(
            Field::text(row, 5 + name_width, format!("({}:{})", host.address, host.port))
                .color(Color::Green),
        );
    }

    screen.push(Field::text(21, 4, "Enter 99 or X to disconnect").color(Color::White));
    screen.push(
        Field::text(23, 4, format!("Enter selection (1-{}, 99, or X):", catalog.len()))
            .color(Color::Red),
    );
    screen.push(
        Field::input(23, 36, SELECTION)
            .color(Color::Green)
            .highlight(Highlight::Underscore),
    );
    screen.push(Field::stop(23, 39));
    screen
}

pub fn menu_rules() -> Rules {
    Rules::from([(SELECTION.to_string(), Validator::NonBlank)])
}

/// Notice shown when a backend connection cannot be opened
pub fn connect_error_screen(host: &Host, error: &str) -> Screen {
    vec![
        Field::text(1, 1, "Connection Error").color(Color::White),
        Field::text(3, 1, format!("Failed to connect to {}: {}", host.name, error))
            .color(Color::White),
        Field::text(5, 1, "Press Enter to continue").color(Color::White),
    ]
}
