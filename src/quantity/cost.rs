quantity!(
    /// Money lost to (positive) or gained from (negative) the grid.
    Euro, suffix: "€", precision: 4
);
